//! Token-to-tree assembly.
//!
//! The assembler owns the stack of open elements. Each frame accumulates
//! one element's [`OrderedMap`]; closing a frame simplifies text-only
//! elements to scalars and assigns the result into the parent under the
//! element's display key, promoting repeats to sequences.

use crate::error::{Error, Result};
use crate::map::{OrderedMap, Value};

use super::input::{Name, Token};
use super::Options;

/// One open element.
struct Frame {
    /// The display key this element will be assigned under.
    display: String,
    /// The tag name as written, for end-tag matching.
    raw: String,
    map: OrderedMap,
}

pub(crate) struct Assembler<'o> {
    options: &'o Options,
    /// Frame 0 is the document root and is never popped.
    stack: Vec<Frame>,
}

impl<'o> Assembler<'o> {
    pub fn new(options: &'o Options) -> Self {
        Self {
            options,
            stack: vec![Frame {
                display: String::new(),
                raw: String::new(),
                map: OrderedMap::new(),
            }],
        }
    }

    /// Number of open elements (excluding the document root).
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Applies one token to the tree under construction.
    pub fn apply(&mut self, token: Token) -> Result<()> {
        match token {
            Token::StartElement {
                name,
                attributes,
                self_closing,
            } => {
                self.start_element(&name, attributes);
                if self_closing {
                    self.end_element();
                }
            }
            Token::EndElement { name } => self.handle_end(&name)?,
            Token::Text(text) | Token::CData(text) => self.text(&text),
            Token::Comment(comment) => self.push_meta("#comments", comment),
            Token::Pi { target, data } => {
                self.push_meta("#pi", format!("target={target} data={data}"));
            }
            Token::Directive(directive) => self.push_meta("#directive", directive),
            Token::Eof => {}
        }
        Ok(())
    }

    fn start_element(&mut self, name: &Name, attributes: Vec<(Name, String)>) {
        let display = self.display_name(name);
        let raw = name.local.clone();
        let mut map = OrderedMap::with_capacity(attributes.len());
        for (attr, value) in attributes {
            let key = self.display_name(&attr);
            let processed = self.process_value(&value, &key);
            map.put(format!("@{key}"), processed);
        }
        self.stack.push(Frame { display, raw, map });
    }

    /// Handles an end tag. Strict mode requires it to match the open
    /// element; lenient mode closes through to the nearest matching open
    /// frame (recovering `<b><i></b>` soup) and drops strays.
    fn handle_end(&mut self, name: &str) -> Result<()> {
        // End tags arrive as written; match on the local part.
        let name = name.rsplit(':').next().unwrap_or(name);
        if self.depth() == 0 {
            if self.options.lenient {
                return Ok(());
            }
            return Err(Error::syntax(format!("unexpected end tag </{name}>"), 0, 0));
        }
        if !self.options.lenient {
            // stack is never empty; frame 0 is the permanent root
            let open = self.stack.last().map(|f| f.raw.clone()).unwrap_or_default();
            if open != name {
                return Err(Error::syntax(
                    format!("mismatched end tag: expected </{open}>, found </{name}>"),
                    0,
                    0,
                ));
            }
            self.end_element();
            return Ok(());
        }
        // Lenient: find the matching open frame, if any.
        let matched = self
            .stack
            .iter()
            .skip(1)
            .rposition(|f| f.raw.eq_ignore_ascii_case(name));
        if let Some(offset) = matched {
            let target_len = offset + 1; // index within full stack
            while self.stack.len() > target_len {
                self.end_element();
            }
        }
        Ok(())
    }

    /// Records character data in both text projections: `#text` holds the
    /// trimmed concatenation for data access, `#seq` the space-normalized
    /// fragment for the document-order view.
    fn text(&mut self, raw: &str) {
        let text_content = raw.trim();
        let mut seq_content = raw.replace(['\n', '\t'], " ");
        if seq_content.trim().is_empty() {
            seq_content = String::new();
        }
        if text_content.is_empty() && seq_content.is_empty() {
            return;
        }
        let retain_seq = self.options.retain_seq;
        let frame = match self.stack.last_mut() {
            Some(f) => f,
            None => return,
        };
        if !text_content.is_empty() {
            match frame.map.get_mut("#text") {
                Some(Value::String(existing)) => existing.push_str(text_content),
                _ => frame.map.put("#text", text_content),
            }
        }
        if retain_seq && !seq_content.is_empty() {
            match frame.map.get_mut("#seq") {
                Some(Value::List(seq)) => seq.push(Value::String(seq_content)),
                _ => frame
                    .map
                    .put("#seq", Value::List(vec![Value::String(seq_content)])),
            }
        }
    }

    fn push_meta(&mut self, key: &str, item: String) {
        let frame = match self.stack.last_mut() {
            Some(f) => f,
            None => return,
        };
        match frame.map.get_mut(key) {
            Some(Value::List(list)) => list.push(Value::String(item)),
            _ => frame.map.put(key, Value::List(vec![Value::String(item)])),
        }
    }

    /// Pops the current frame, simplifies it, and assigns it to the parent.
    pub fn end_element(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        let frame = match self.stack.pop() {
            Some(f) => f,
            None => return,
        };
        let tag = frame.display;

        // A node whose only content was text (plus the then-redundant
        // sequence view) reduces to a scalar.
        let only_text = frame.map.len() == 1 && frame.map.has("#text");
        let text_and_seq =
            frame.map.len() == 2 && frame.map.has("#text") && frame.map.has("#seq");
        let final_value = if only_text || text_and_seq {
            match frame.map.get("#text") {
                Some(Value::String(s)) => self.process_value(s, &tag),
                Some(other) => other.clone(),
                None => Value::Map(frame.map),
            }
        } else {
            Value::Map(frame.map)
        };

        let forced = self.options.force_array.contains(&tag);
        let retain_seq = self.options.retain_seq;
        let parent = match self.stack.last_mut() {
            Some(p) => p,
            None => return,
        };

        let seq_copy = retain_seq.then(|| final_value.clone());

        match parent.map.get_mut(&tag) {
            None => {
                if forced {
                    parent.map.put(tag.clone(), Value::List(vec![final_value]));
                } else {
                    parent.map.put(tag.clone(), final_value);
                }
            }
            Some(Value::List(list)) => list.push(final_value),
            Some(existing) => {
                let previous = std::mem::take(existing);
                *existing = Value::List(vec![previous, final_value]);
            }
        }

        if let Some(copy) = seq_copy {
            match parent.map.get_mut("#seq") {
                Some(Value::List(seq)) => seq.push(copy),
                _ => parent.map.put("#seq", Value::List(vec![copy])),
            }
        }
    }

    /// Force-closes all open elements (lenient end-of-input recovery).
    pub fn close_all(&mut self) {
        while self.depth() > 0 {
            self.end_element();
        }
    }

    pub fn finish(mut self) -> OrderedMap {
        self.close_all();
        match self.stack.pop() {
            Some(root) => root.map,
            None => OrderedMap::new(),
        }
    }

    /// Resolves a tokenizer name to its display key: soup mode lowercases
    /// the local part, a registered namespace contributes its alias, and
    /// unmapped namespaces drop to the bare local name.
    fn display_name(&self, name: &Name) -> String {
        let local = if self.options.soup {
            name.local.to_lowercase()
        } else {
            name.local.clone()
        };
        if let Some(url) = &name.namespace {
            if let Some(alias) = self.options.namespaces.get(url) {
                if !alias.is_empty() {
                    return format!("{alias}:{local}");
                }
            }
        }
        local
    }

    /// Applies the registered hook for `name`, or type inference, to a
    /// raw scalar string.
    fn process_value(&self, raw: &str, name: &str) -> Value {
        if let Some(hook) = self.options.hook_for(name) {
            return hook(raw);
        }
        if self.options.infer_types {
            return infer_type(raw);
        }
        Value::String(raw.to_string())
    }
}

/// Scalar type inference: exact `true`/`false` become booleans, integer
/// text becomes an integer, and floating-point text containing a `.`
/// becomes a float. Everything else stays a string.
pub(crate) fn infer_type(raw: &str) -> Value {
    if raw == "true" {
        return Value::Bool(true);
    }
    if raw == "false" {
        return Value::Bool(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if raw.contains('.') {
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Float(f);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_str, parse_with_options, Options};

    #[test]
    fn test_simple_document() {
        let tree = parse_str(r#"<library><book id="1">The Little Prince</book></library>"#)
            .unwrap();
        let book = tree.get_node("library").unwrap();
        // Simplified to a map because the attribute is present.
        let book = book.get_node("book").unwrap();
        assert_eq!(book.string("@id"), "1");
        assert_eq!(book.string("#text"), "The Little Prince");
    }

    #[test]
    fn test_text_only_element_simplifies() {
        let tree = parse_str("<order><id>1001</id></order>").unwrap();
        assert_eq!(
            tree.get_path("order/id"),
            Some(&Value::String("1001".to_string()))
        );
    }

    #[test]
    fn test_repeated_child_becomes_sequence() {
        let tree = parse_str("<store><book>A</book><book>B</book><book>C</book></store>")
            .unwrap();
        let books = tree.get_path("store/book").unwrap().as_list().unwrap();
        assert_eq!(books.len(), 3);
        assert_eq!(books[0], Value::String("A".to_string()));
        assert_eq!(books[2], Value::String("C".to_string()));
    }

    #[test]
    fn test_force_array_singleton() {
        let opts = Options::default().force_array(["book"]);
        let tree =
            parse_with_options("<library><book>One</book></library>".as_bytes(), &opts).unwrap();
        let books = tree.get_path("library/book").unwrap().as_list().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0], Value::String("One".to_string()));
    }

    #[test]
    fn test_attribute_order_preserved() {
        let tree = parse_str(r#"<t z="1" a="2" m="3"/>"#).unwrap();
        let node = tree.get_node("t").unwrap();
        assert_eq!(node.keys(), vec!["@z", "@a", "@m"]);
    }

    #[test]
    fn test_metadata_sequences() {
        let tree = parse_str(
            "<?pi-target some data?><!-- c1 --><root><!-- c2 --><a>x</a></root>",
        )
        .unwrap();
        let root_comments = tree.get_path("#comments").unwrap().as_list().unwrap();
        assert_eq!(root_comments[0], Value::String(" c1 ".to_string()));
        let pis = tree.get_path("#pi").unwrap().as_list().unwrap();
        assert_eq!(
            pis[0],
            Value::String("target=pi-target data=some data".to_string())
        );
        let inner = tree.get_node("root").unwrap();
        let inner_comments = inner.get("#comments").unwrap().as_list().unwrap();
        assert_eq!(inner_comments[0], Value::String(" c2 ".to_string()));
    }

    #[test]
    fn test_seq_preserves_mixed_content_order() {
        let tree =
            parse_str("<p>The <b>stock</b> is low</p>").unwrap();
        let p = tree.get_node("p").unwrap();
        let seq = p.get("#seq").unwrap().as_list().unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq[0], Value::String("The ".to_string()));
        assert_eq!(seq[1], Value::String("stock".to_string()));
        assert_eq!(seq[2], Value::String(" is low".to_string()));
        // The data view trims and concatenates.
        assert_eq!(p.string("#text"), "The is low");
    }

    #[test]
    fn test_retain_seq_disabled() {
        let opts = Options::default().retain_seq(false);
        let tree = parse_with_options("<p>The <b>stock</b> is low</p>".as_bytes(), &opts).unwrap();
        let p = tree.get_node("p").unwrap();
        assert!(p.get("#seq").is_none());
        // Deep extraction falls back to recursive concatenation.
        assert_eq!(Value::Map(p.clone()).text(), "The is lowstock");
    }

    #[test]
    fn test_type_inference() {
        let opts = Options::default().experimental(true);
        let tree = parse_with_options(
            "<r><i>42</i><f>2.5</f><b>true</b><s>x7</s></r>".as_bytes(),
            &opts,
        )
        .unwrap();
        assert_eq!(tree.get_path("r/i"), Some(&Value::Int(42)));
        assert_eq!(tree.get_path("r/f"), Some(&Value::Float(2.5)));
        assert_eq!(tree.get_path("r/b"), Some(&Value::Bool(true)));
        assert_eq!(tree.get_path("r/s"), Some(&Value::String("x7".to_string())));
    }

    #[test]
    fn test_value_hook_on_element_and_attribute() {
        let opts = Options::default()
            .with_value_hook("when", |raw| Value::String(format!("hooked:{raw}")))
            .with_value_hook("id", |raw| Value::Int(raw.parse().unwrap_or(-1)));
        let tree = parse_with_options(
            r#"<e id="9"><when>now</when></e>"#.as_bytes(),
            &opts,
        )
        .unwrap();
        assert_eq!(tree.get_path("e/@id"), Some(&Value::Int(9)));
        assert_eq!(
            tree.get_path("e/when"),
            Some(&Value::String("hooked:now".to_string()))
        );
    }

    #[test]
    fn test_namespace_alias() {
        let opts = Options::default().register_namespace("sig", "http://www.w3.org/2000/09/xmldsig#");
        let tree = parse_with_options(
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:Value>x</ds:Value></ds:Signature>"#
                .as_bytes(),
            &opts,
        )
        .unwrap();
        assert_eq!(tree.string("sig:Signature/sig:Value"), "x");
        // Unregistered namespaces drop to the local name.
        let tree2 = parse_str(
            r#"<ds:Signature xmlns:ds="http://other"><ds:Value>y</ds:Value></ds:Signature>"#,
        )
        .unwrap();
        assert_eq!(tree2.string("Signature/Value"), "y");
    }

    #[test]
    fn test_soup_mode_html() {
        let opts = Options::default().experimental(true);
        let html = r#"<HTML><Body><P>Hello<br><IMG src="x.png">World</P>
            <script>if (a < b && c > 2) { go(); }</script></Body></HTML>"#;
        let tree = parse_with_options(html.as_bytes(), &opts).unwrap();
        // Names are lowercased and void tags auto-close.
        let body = tree.get_node("html").unwrap().get_node("body").unwrap();
        assert!(body.get("p").is_some());
        let script = body.string("script");
        assert_eq!(script, "if (a < b && c > 2) { go(); }");
    }

    #[test]
    fn test_soup_recovers_unclosed_tags() {
        let opts = Options::default().experimental(true);
        let tree = parse_with_options("<div><b>bold<i>both</b>after</div>".as_bytes(), &opts)
            .unwrap();
        assert!(tree.get_node("div").is_some());
    }

    #[test]
    fn test_strict_mismatched_end_fails() {
        let err = parse_str("<a><b></a></b>").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn test_strict_unclosed_fails() {
        assert!(parse_str("<a><b>text").is_err());
    }

    #[test]
    fn test_cdata_becomes_text() {
        let tree = parse_str("<t><![CDATA[a < b]]></t>").unwrap();
        assert_eq!(tree.string("t"), "a < b");
    }

    #[test]
    fn test_legacy_charset_document() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>");
        bytes.extend_from_slice(b"<data>caf\xE9</data>");
        let opts = Options::default().legacy_charsets(true);
        let tree = parse_with_options(bytes.as_slice(), &opts).unwrap();
        assert_eq!(tree.string("data"), "café");
    }

    #[test]
    fn test_infer_type_rules() {
        assert_eq!(infer_type("true"), Value::Bool(true));
        assert_eq!(infer_type("017"), Value::Int(17));
        assert_eq!(infer_type("3.14"), Value::Float(3.14));
        // No dot means no float, even if parseable.
        assert_eq!(infer_type("1e3"), Value::String("1e3".to_string()));
    }
}
