//! Legacy charset translation.
//!
//! Maps a declared encoding name onto an `encoding_rs` transcoder. The
//! supported table is deliberately small: `iso-8859-1`/`latin1` and
//! `windows-1252`/`cp1252` all resolve to the Windows-1252 superset table
//! (so files that declare ISO-8859-1 but carry bytes in `0x80–0x9F` still
//! decode correctly, a long-standing industry practice and exactly the
//! WHATWG behavior `encoding_rs` implements), and `utf-8`/`utf8` pass
//! through. Anything else is rejected with
//! [`Error::UnsupportedCharset`](crate::Error::UnsupportedCharset).
//!
//! Detection works the way the strict XML pipeline expects: a Byte Order
//! Mark wins, then the XML declaration's `encoding=` attribute (scanned as
//! ASCII so it can be read even when the body is not valid UTF-8), then
//! the UTF-8 default.

use encoding_rs::{Decoder, Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};

use crate::error::{Error, Result};

/// Resolves a declared encoding label to its transcoder.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCharset`] for labels outside the supported
/// table.
pub fn lookup(label: &str) -> Result<&'static Encoding> {
    match label.to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "windows-1252" | "cp1252" => Ok(WINDOWS_1252),
        "utf-8" | "utf8" => Ok(UTF_8),
        other => Err(Error::UnsupportedCharset(other.to_string())),
    }
}

/// Detects a Byte Order Mark, returning the indicated encoding and the
/// number of BOM bytes to skip. Defaults to UTF-8 with no skip.
#[must_use]
pub fn detect_bom(bytes: &[u8]) -> (&'static Encoding, usize) {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        (UTF_8, 3)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        (UTF_16BE, 2)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        (UTF_16LE, 2)
    } else {
        (UTF_8, 0)
    }
}

/// Determines the document encoding from the head of the byte stream:
/// BOM first, then the declaration's `encoding=` attribute, then UTF-8.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCharset`] when the declaration names an
/// encoding outside the supported table.
pub fn sniff(head: &[u8]) -> Result<(&'static Encoding, usize)> {
    let (bom_encoding, skip) = detect_bom(head);
    if skip > 0 && bom_encoding != UTF_8 {
        // A UTF-16 BOM is authoritative; the declaration cannot override
        // the byte order it announces.
        return Ok((bom_encoding, skip));
    }
    if let Some(declared) = declared_encoding(&head[skip..]) {
        return Ok((lookup(&declared)?, skip));
    }
    Ok((UTF_8, skip))
}

/// Extracts the `encoding` attribute value from an XML declaration by
/// scanning raw bytes as ASCII. The declaration is required to be
/// ASCII-compatible, so this works even when the document body is not
/// valid UTF-8. Returns `None` if there is no declaration or no
/// `encoding=` attribute.
#[must_use]
pub fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let limit = bytes.len().min(200);
    let scan = &bytes[..limit];

    if !scan.starts_with(b"<?xml") {
        return None;
    }
    let decl_end = scan.windows(2).position(|w| w == b"?>")?;
    let decl = &scan[..decl_end];

    let needle = b"encoding";
    let pos = decl.windows(needle.len()).position(|w| w == needle)?;
    let rest = skip_ascii_whitespace(&decl[pos + needle.len()..]);
    let rest = rest.strip_prefix(b"=")?;
    let rest = skip_ascii_whitespace(rest);

    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value = &rest[1..];
    let end = value.iter().position(|&b| b == quote)?;
    let name = &value[..end];
    if name.iter().all(u8::is_ascii) {
        Some(String::from_utf8_lossy(name).into_owned())
    } else {
        None
    }
}

fn skip_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let n = bytes
        .iter()
        .take_while(|&&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .count();
    &bytes[n..]
}

/// Decodes a whole byte buffer to UTF-8, honoring BOM and declaration.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCharset`] for unknown declared encodings
/// and [`Error::Syntax`](crate::Error::Syntax) for byte sequences invalid
/// in the detected encoding.
pub fn decode_to_utf8(bytes: &[u8]) -> Result<String> {
    let (encoding, skip) = sniff(bytes)?;
    let content = &bytes[skip..];
    if encoding == UTF_8 {
        return match std::str::from_utf8(content) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => Err(Error::syntax("input is not valid UTF-8", 1, 1)),
        };
    }
    let (text, _, had_errors) = encoding.decode(content);
    if had_errors {
        return Err(Error::syntax(
            format!("malformed byte sequence for encoding {}", encoding.name()),
            1,
            1,
        ));
    }
    Ok(text.into_owned())
}

/// Incremental byte-to-UTF-8 transcoder for the streaming tokenizer.
///
/// Wraps an `encoding_rs` decoder so multi-byte sequences split across
/// chunk boundaries carry over correctly.
pub(crate) struct StreamDecoder {
    inner: Decoder,
}

impl StreamDecoder {
    pub(crate) fn new(encoding: &'static Encoding) -> Self {
        Self {
            inner: encoding.new_decoder_with_bom_removal(),
        }
    }

    /// Decodes the next chunk, appending to `out`. Pass `last = true` for
    /// the final (possibly empty) chunk so a dangling partial sequence is
    /// flushed. Returns `true` if any malformed sequence was replaced,
    /// which strict parsing treats as fatal.
    pub(crate) fn push(&mut self, bytes: &[u8], last: bool, out: &mut String) -> bool {
        let needed = self
            .inner
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 4);
        out.reserve(needed);
        let (_, read, had_replacements) = self.inner.decode_to_string(bytes, out, last);
        debug_assert_eq!(read, bytes.len());
        had_replacements
    }
}
