//! Canonical serialization for signature digests.
//!
//! Produces a byte-exact canonical form in the spirit of W3C Canonical
//! XML: attributes sorted lexicographically by name, no self-closing
//! shorthand, fixed escape tables, no pretty-print whitespace, and no XML
//! declaration. Signature assemblers hash exactly these bytes before RSA
//! signing, so third-party verifiers accept the digests.
//!
//! Note the deliberate divergence from the plain encoder: the encoder
//! keeps attribute insertion order for wire compatibility with
//! order-sensitive consumers, while the canonical form sorts. Both
//! orderings coexist; they serve different contracts.
//!
//! ```
//! use xmlmap::{canonicalize, OrderedMap};
//!
//! let mut tree = OrderedMap::new();
//! tree.set_path("t/@z", "1");
//! tree.set_path("t/@a", "2");
//! assert_eq!(canonicalize(&tree), b"<t a=\"2\" z=\"1\"></t>");
//! ```

use crate::map::{is_metadata_key, OrderedMap, Value};

/// Canonicalizes a tree or fragment.
///
/// The top-level map itself has no tag context: its children are emitted
/// as elements and the map acts as a fragment wrapper. Callers supplying
/// the outer element separately rely on this to canonicalize content
/// fragments.
#[must_use]
pub fn canonicalize(tree: &OrderedMap) -> Vec<u8> {
    let mut out = Vec::new();
    write_map(&mut out, tree, None);
    out
}

/// Canonicalizes a single value under the given element tag.
#[must_use]
pub fn canonicalize_value(value: &Value, tag: &str) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value, Some(tag));
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value, tag: Option<&str>) {
    match value {
        Value::Map(map) => write_map(out, map, tag),
        Value::List(items) => {
            // One element per item under the same name.
            for item in items {
                write_value(out, item, tag);
            }
        }
        scalar => {
            if let Some(tag) = tag {
                out.extend_from_slice(b"<");
                out.extend_from_slice(tag.as_bytes());
                out.extend_from_slice(b">");
                escape_text(out, &scalar.to_string());
                out.extend_from_slice(b"</");
                out.extend_from_slice(tag.as_bytes());
                out.extend_from_slice(b">");
            } else {
                escape_text(out, &scalar.to_string());
            }
        }
    }
}

fn write_map(out: &mut Vec<u8>, map: &OrderedMap, tag: Option<&str>) {
    if let Some(tag) = tag {
        out.extend_from_slice(b"<");
        out.extend_from_slice(tag.as_bytes());
    }

    // Attributes in lexicographic order of attribute name.
    let mut attrs: Vec<&str> = map
        .iter()
        .filter_map(|(key, _)| key.strip_prefix('@').map(|_| key))
        .collect();
    attrs.sort_unstable();
    for key in attrs {
        if let Some(value) = map.get(key) {
            out.extend_from_slice(b" ");
            out.extend_from_slice(key[1..].as_bytes());
            out.extend_from_slice(b"=\"");
            escape_attr(out, &value.to_string());
            out.extend_from_slice(b"\"");
        }
    }

    if tag.is_some() {
        out.extend_from_slice(b">");
    }

    // Text first; a CDATA marker canonicalizes as escaped text.
    if let Some(text) = map.get("#text") {
        escape_text(out, &text.to_string());
    } else if let Some(cdata) = map.get("#cdata") {
        escape_text(out, &cdata.to_string());
    }

    for (key, value) in map.iter() {
        if key.starts_with('@') || is_metadata_key(key) {
            continue;
        }
        write_value(out, value, Some(key));
    }

    if let Some(tag) = tag {
        // No self-closing shorthand: an empty element closes explicitly.
        out.extend_from_slice(b"</");
        out.extend_from_slice(tag.as_bytes());
        out.extend_from_slice(b">");
    }
}

/// Text escaping: `&`, `<`, `>`, and carriage return.
fn escape_text(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '\r' => out.extend_from_slice(b"&#xD;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

/// Attribute escaping: text rules plus quote, newline, and tab.
fn escape_attr(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '\r' => out.extend_from_slice(b"&#xD;"),
            '"' => out.extend_from_slice(b"&quot;"),
            '\n' => out.extend_from_slice(b"&#xA;"),
            '\t' => out.extend_from_slice(b"&#x9;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}
