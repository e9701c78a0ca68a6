//! Deterministic XML encoder.
//!
//! Writes an [`OrderedMap`] tree back to XML. Attributes emit in the order
//! they sit in the map, children in key order, and a sequence repeats its
//! key once per item, so a parsed document round-trips with its element
//! and attribute order intact. Plain unordered maps adapt through the
//! sorted [`From<HashMap>`](crate::OrderedMap) conversion, keeping output
//! deterministic either way.
//!
//! The encoder never emits an XML declaration; `#`-metadata keys other
//! than `#text`, `#cdata`, and `#comments` are not serialized.
//!
//! ```
//! use xmlmap::{marshal, OrderedMap};
//!
//! let mut tree = OrderedMap::new();
//! tree.set_path("Order/Customer/@id", "C55");
//! tree.set_path("Order/Customer/Name", "Alice");
//! tree.set_path("Order/ID", "1001");
//!
//! assert_eq!(
//!     marshal(&tree).unwrap(),
//!     "<Order><Customer id=\"C55\"><Name>Alice</Name></Customer><ID>1001</ID></Order>"
//! );
//! ```

pub mod c14n;

use std::io::Write;

use crate::error::{Error, Result};
use crate::map::{is_metadata_key, OrderedMap, Value};
use crate::parser::Options;

/// Serializes the tree to a writer.
///
/// The top-level map must contain exactly one non-metadata key (the
/// document element); `#`-metadata at the root is permitted and skipped.
///
/// # Errors
///
/// Returns [`Error::RootCardinality`] when the root key count is not one,
/// and propagates writer I/O errors.
pub fn encode<W: Write>(writer: &mut W, tree: &OrderedMap, options: &Options) -> Result<()> {
    let roots: Vec<(&str, &Value)> = tree
        .iter()
        .filter(|(key, _)| !is_metadata_key(key))
        .collect();
    let (tag, value) = match roots.as_slice() {
        [single] => *single,
        other => return Err(Error::RootCardinality(other.len())),
    };
    encode_node(writer, tag, value, options, 0)?;
    Ok(())
}

/// Serializes the tree to a `String` with default options.
///
/// # Errors
///
/// Same as [`encode`].
pub fn marshal(tree: &OrderedMap) -> Result<String> {
    marshal_with_options(tree, &Options::default())
}

/// Serializes the tree to a `String` with the given options
/// (pretty-printing, namespace injection).
///
/// # Errors
///
/// Same as [`encode`].
pub fn marshal_with_options(tree: &OrderedMap, options: &Options) -> Result<String> {
    let mut buf = Vec::new();
    encode(&mut buf, tree, options)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[allow(clippy::too_many_lines)]
fn encode_node<W: Write>(
    writer: &mut W,
    tag: &str,
    value: &Value,
    options: &Options,
    depth: usize,
) -> Result<()> {
    // A sequence repeats the key once per item.
    if let Value::List(items) = value {
        for item in items {
            encode_node(writer, tag, item, options, depth)?;
        }
        return Ok(());
    }

    if options.pretty && depth > 0 {
        write!(writer, "\n{}", "  ".repeat(depth))?;
    }
    write!(writer, "<{tag}")?;

    // Registered namespaces are declared on the root element, in URL
    // order so output is stable.
    if depth == 0 && !options.namespaces.is_empty() {
        let mut urls: Vec<&String> = options.namespaces.keys().collect();
        urls.sort();
        for url in urls {
            if let Some(alias) = options.namespaces.get(url) {
                write!(writer, " xmlns:{alias}=\"{}\"", escape_attr(url))?;
            }
        }
    }

    let map = match value {
        Value::Map(m) => m,
        scalar => {
            // Scalar leaf: text between the tags.
            write!(writer, ">{}</{tag}>", escape_text(&scalar.to_string()))?;
            return Ok(());
        }
    };

    let mut text: Option<&Value> = None;
    let mut cdata: Option<&Value> = None;
    let mut comments: Option<&[Value]> = None;
    let mut children: Vec<(&str, &Value)> = Vec::new();

    for (key, val) in map.iter() {
        if let Some(attr) = key.strip_prefix('@') {
            write!(writer, " {attr}=\"{}\"", escape_attr(&val.to_string()))?;
        } else if key == "#text" {
            text = Some(val);
        } else if key == "#cdata" {
            cdata = Some(val);
        } else if key == "#comments" {
            comments = val.as_list();
        } else if !is_metadata_key(key) {
            children.push((key, val));
        }
    }

    write!(writer, ">")?;

    if let Some(items) = comments {
        for comment in items {
            if options.pretty {
                write!(writer, "\n{}", "  ".repeat(depth + 1))?;
            }
            write!(writer, "<!--{comment}-->")?;
        }
    }

    // CDATA wins over plain text when both are present.
    if let Some(content) = cdata {
        if options.pretty {
            write!(writer, "\n{}", "  ".repeat(depth + 1))?;
        }
        write!(writer, "<![CDATA[{content}]]>")?;
    } else if let Some(content) = text {
        write!(writer, "{}", escape_text(&content.to_string()))?;
    }

    for &(key, val) in &children {
        encode_node(writer, key, val, options, depth + 1)?;
    }

    let broke_line =
        options.pretty && (!children.is_empty() || comments.is_some() || cdata.is_some());
    if broke_line {
        write!(writer, "\n{}", "  ".repeat(depth))?;
    }
    write!(writer, "</{tag}>")?;
    Ok(())
}

/// Escapes element text content: `&`, `<`, `>`.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes attribute values: text rules plus `"` and whitespace controls.
fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
    out
}
