//! Raw-text soup sanitizer.
//!
//! HTML raw-text elements (`script`, `style`, `code`, `pre`, `textarea`)
//! carry bodies that are opaque character data in HTML but routinely break
//! a strict XML tokenizer (`if (a < b && c > d)`, unescaped ampersands,
//! angle brackets in CSS selectors). Before tokenization, soup mode wraps
//! each such interior in a CDATA section so the tokenizer sees it verbatim.
//!
//! A CDATA terminator already present in the interior is rewritten to the
//! split sequence `]]]]><![CDATA[>` so the wrapping stays balanced; parsers
//! reassemble the original `]]>` from the adjacent sections. The transform
//! is a single pass over bytes, is idempotent on already-wrapped interiors,
//! and leaves unterminated raw-text tags untouched.

use memchr::memchr;

/// Tag names whose bodies are raw text in HTML.
const RAW_TEXT_TAGS: [&[u8]; 5] = [b"script", b"style", b"code", b"pre", b"textarea"];

const CDATA_OPEN: &[u8] = b"<![CDATA[";
const CDATA_CLOSE: &[u8] = b"]]>";
/// The balanced rewrite for a `]]>` occurring inside wrapped content.
const CDATA_SPLIT: &[u8] = b"]]]]><![CDATA[>";

/// Wraps raw-text tag interiors in CDATA sections.
///
/// ```
/// use xmlmap::sanitize::sanitize_soup;
///
/// let out = sanitize_soup(b"<script>if (a < b) run();</script>");
/// assert_eq!(out, b"<script><![CDATA[if (a < b) run();]]></script>");
/// ```
#[must_use]
pub fn sanitize_soup(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 8 + 64);
    let mut pos = 0;

    while let Some(offset) = memchr(b'<', &input[pos..]) {
        let lt = pos + offset;
        out.extend_from_slice(&input[pos..lt]);

        if let Some((tag, open_end)) = match_open_tag(input, lt) {
            if let Some((close_start, close_end)) = find_close_tag(input, open_end, tag) {
                out.extend_from_slice(&input[lt..open_end]);
                write_wrapped(&mut out, &input[open_end..close_start]);
                out.extend_from_slice(&input[close_start..close_end]);
                pos = close_end;
                continue;
            }
        }

        out.push(b'<');
        pos = lt + 1;
    }

    out.extend_from_slice(&input[pos..]);
    out
}

/// Matches an opening raw-text tag at `lt` (which points at `<`).
/// Returns the tag name and the position just past the closing `>`.
fn match_open_tag(input: &[u8], lt: usize) -> Option<(&'static [u8], usize)> {
    let after = &input[lt + 1..];
    for tag in RAW_TEXT_TAGS {
        if !starts_with_ignore_case(after, tag) {
            continue;
        }
        match after.get(tag.len()) {
            // <script>
            Some(b'>') => return Some((tag, lt + 1 + tag.len() + 1)),
            // <script src="...">: skip to the end of the tag
            Some(b' ' | b'\t' | b'\r' | b'\n') => {
                let gt = memchr(b'>', &after[tag.len()..])?;
                let open_end = lt + 1 + tag.len() + gt + 1;
                // A self-closing raw-text tag has no interior to protect.
                if input.get(open_end - 2) == Some(&b'/') {
                    return None;
                }
                return Some((tag, open_end));
            }
            _ => {}
        }
    }
    None
}

/// Finds the matching `</tag>` (case-insensitive) at or after `from`.
/// Returns the close tag's start and end positions.
fn find_close_tag(input: &[u8], from: usize, tag: &[u8]) -> Option<(usize, usize)> {
    let mut pos = from;
    while let Some(offset) = memchr(b'<', &input[pos..]) {
        let lt = pos + offset;
        let rest = &input[lt..];
        if rest.len() >= tag.len() + 3
            && rest[1] == b'/'
            && starts_with_ignore_case(&rest[2..], tag)
            && rest[2 + tag.len()] == b'>'
        {
            return Some((lt, lt + tag.len() + 3));
        }
        pos = lt + 1;
    }
    None
}

/// Emits `interior` wrapped in CDATA, escaping embedded terminators.
/// An interior that is already exactly one CDATA section passes through.
fn write_wrapped(out: &mut Vec<u8>, interior: &[u8]) {
    if is_single_cdata(interior) {
        out.extend_from_slice(interior);
        return;
    }
    out.extend_from_slice(CDATA_OPEN);
    let mut pos = 0;
    while let Some(offset) = find(&interior[pos..], CDATA_CLOSE) {
        out.extend_from_slice(&interior[pos..pos + offset]);
        out.extend_from_slice(CDATA_SPLIT);
        pos += offset + CDATA_CLOSE.len();
    }
    out.extend_from_slice(&interior[pos..]);
    out.extend_from_slice(CDATA_CLOSE);
}

/// Returns `true` when `interior`, modulo surrounding whitespace, is a
/// single complete CDATA section (so re-sanitizing is a no-op).
fn is_single_cdata(interior: &[u8]) -> bool {
    let trimmed = trim_ascii(interior);
    trimmed.starts_with(CDATA_OPEN)
        && trimmed.ends_with(CDATA_CLOSE)
        && find(trimmed, CDATA_CLOSE) == Some(trimmed.len() - CDATA_CLOSE.len())
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .take_while(|b| b.is_ascii_whitespace())
        .count();
    let end = bytes.len()
        - bytes
            .iter()
            .rev()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
    if start >= end { &[] } else { &bytes[start..end] }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len()
        && haystack
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}
