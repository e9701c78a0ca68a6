//! Incremental XML tokenizer.
//!
//! Reads from a caller-supplied `Read` in chunks, transcoding through the
//! charset layer, and emits owned tokens: start/end elements (with
//! namespace-resolved attributes), character data, CDATA, comments,
//! processing instructions, and directives. The consumed buffer prefix is
//! compacted away between tokens, so memory stays bounded by the largest
//! single token plus one chunk regardless of document size.
//!
//! Strict mode reports malformed constructs as
//! [`Error::Syntax`](crate::Error::Syntax) with line and column. Lenient
//! mode auto-closes HTML void elements, accepts unquoted and bare
//! attributes, resolves HTML named entities, and leaves unknown entity
//! references in place; the tree builder above additionally swallows
//! lenient-mode token errors. Every error path either consumes input or
//! lands on end-of-stream, so a recovery loop always makes progress.

use std::collections::HashMap;
use std::io::Read;

use encoding_rs::UTF_8;

use crate::encoding::{sniff, StreamDecoder};
use crate::error::{Error, Result};

/// Bytes requested from the reader per refill.
const CHUNK_SIZE: usize = 8 * 1024;
/// Consumed-prefix length that triggers buffer compaction.
const COMPACT_THRESHOLD: usize = 32 * 1024;

/// HTML void elements, auto-closed in lenient mode.
const VOID_TAGS: [&str; 17] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr", "command", "keygen", "menuitem",
];

/// Named entities resolved in lenient mode beyond the XML builtins.
/// A pragmatic slice of the HTML set; numeric references cover the rest.
const HTML_ENTITIES: [(&str, &str); 34] = [
    ("nbsp", "\u{A0}"),
    ("iexcl", "\u{A1}"),
    ("cent", "\u{A2}"),
    ("pound", "\u{A3}"),
    ("curren", "\u{A4}"),
    ("yen", "\u{A5}"),
    ("sect", "\u{A7}"),
    ("copy", "\u{A9}"),
    ("laquo", "\u{AB}"),
    ("reg", "\u{AE}"),
    ("deg", "\u{B0}"),
    ("plusmn", "\u{B1}"),
    ("middot", "\u{B7}"),
    ("raquo", "\u{BB}"),
    ("frac12", "\u{BD}"),
    ("iquest", "\u{BF}"),
    ("agrave", "\u{E0}"),
    ("aacute", "\u{E1}"),
    ("eacute", "\u{E9}"),
    ("egrave", "\u{E8}"),
    ("iacute", "\u{ED}"),
    ("ntilde", "\u{F1}"),
    ("oacute", "\u{F3}"),
    ("uacute", "\u{FA}"),
    ("uuml", "\u{FC}"),
    ("times", "\u{D7}"),
    ("divide", "\u{F7}"),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201C}"),
    ("rdquo", "\u{201D}"),
    ("hellip", "\u{2026}"),
];

/// Returns `true` for HTML void element names (case-insensitive).
pub(crate) fn is_void_tag(name: &str) -> bool {
    VOID_TAGS.iter().any(|t| t.eq_ignore_ascii_case(name))
}

/// A qualified name with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Name {
    /// The local part, without prefix.
    pub local: String,
    /// The namespace the name resolves to. For a bound prefix this is the
    /// declared URL; an unbound prefix resolves to the prefix itself so a
    /// registered alias can still match it.
    pub namespace: Option<String>,
}

/// One tokenizer event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    StartElement {
        name: Name,
        attributes: Vec<(Name, String)>,
        self_closing: bool,
    },
    EndElement {
        name: String,
    },
    Text(String),
    CData(String),
    Comment(String),
    Pi {
        target: String,
        data: String,
    },
    Directive(String),
    Eof,
}

/// The incremental tokenizer.
pub(crate) struct Tokenizer<R: Read> {
    reader: R,
    decoder: Option<StreamDecoder>,
    /// Raw bytes accumulated before the decoder is installed, so charset
    /// sniffing sees the whole document head even from a trickling reader.
    prelude: Vec<u8>,
    /// Decoded text not yet consumed. `pos` is always on a char boundary.
    buf: String,
    pos: usize,
    line: u32,
    column: u32,
    reader_eof: bool,
    flushed: bool,
    lenient: bool,
    legacy_charsets: bool,
    /// Namespace scopes, innermost last. Each maps prefix (empty string
    /// for the default namespace) to URL.
    ns_stack: Vec<HashMap<String, String>>,
    /// General entities declared in the DOCTYPE internal subset.
    entities: HashMap<String, String>,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R, lenient: bool, legacy_charsets: bool) -> Self {
        Self {
            reader,
            decoder: None,
            prelude: Vec::new(),
            buf: String::new(),
            pos: 0,
            line: 1,
            column: 1,
            reader_eof: false,
            flushed: false,
            lenient,
            legacy_charsets,
            ns_stack: vec![HashMap::new()],
            entities: HashMap::new(),
        }
    }

    // -- Buffer management --

    /// Reads one chunk from the reader into the decode buffer.
    /// Returns `true` if any progress was made (decoded text grew, or
    /// head bytes were accumulated for charset sniffing).
    fn refill(&mut self) -> Result<bool> {
        if self.reader_eof && self.prelude.is_empty() {
            if self.flushed {
                return Ok(false);
            }
            self.flushed = true;
            let before = self.buf.len();
            if let Some(decoder) = self.decoder.as_mut() {
                let bad = decoder.push(&[], true, &mut self.buf);
                if bad && !self.lenient {
                    return Err(self.syntax("truncated character sequence at end of input"));
                }
            }
            return Ok(self.buf.len() > before);
        }

        if !self.reader_eof {
            let mut chunk = [0u8; CHUNK_SIZE];
            let n = loop {
                match self.reader.read(&mut chunk) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(Error::Io(e)),
                }
            };
            if n == 0 {
                self.reader_eof = true;
            } else if self.decoder.is_none() {
                self.prelude.extend_from_slice(&chunk[..n]);
                // Keep gathering head bytes until the XML declaration is
                // guaranteed to be visible for charset sniffing.
                if self.legacy_charsets && self.prelude.len() < 512 {
                    return Ok(true);
                }
            } else {
                let before = self.buf.len();
                let decoder = match self.decoder.as_mut() {
                    Some(d) => d,
                    None => return Ok(false),
                };
                let bad = decoder.push(&chunk[..n], false, &mut self.buf);
                if bad && !self.lenient {
                    return Err(self.syntax("input is not valid for the detected encoding"));
                }
                return Ok(self.buf.len() > before);
            }
        }

        if self.decoder.is_none() {
            let encoding = if self.legacy_charsets {
                sniff(&self.prelude)?.0
            } else {
                UTF_8
            };
            self.decoder = Some(StreamDecoder::new(encoding));
        }
        if !self.prelude.is_empty() {
            let before = self.buf.len();
            let head = std::mem::take(&mut self.prelude);
            let decoder = match self.decoder.as_mut() {
                Some(d) => d,
                None => return Ok(false),
            };
            let bad = decoder.push(&head, false, &mut self.buf);
            if bad && !self.lenient {
                return Err(self.syntax("input is not valid for the detected encoding"));
            }
            return Ok(self.buf.len() > before);
        }
        Ok(true)
    }

    /// Ensures at least `n` bytes are available past `pos`, refilling as
    /// needed. Returns `false` when the stream ends first.
    fn ensure(&mut self, n: usize) -> Result<bool> {
        while self.buf.len() - self.pos < n {
            if !self.refill()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Byte at `pos + offset`, refilling as needed.
    fn peek_at(&mut self, offset: usize) -> Result<Option<u8>> {
        if !self.ensure(offset + 1)? {
            return Ok(None);
        }
        Ok(Some(self.buf.as_bytes()[self.pos + offset]))
    }

    /// Searches for `needle` at or after `pos`, refilling until found or
    /// end of stream. Returns the offset relative to `pos`.
    fn find(&mut self, needle: &str) -> Result<Option<usize>> {
        loop {
            if let Some(i) = self.buf[self.pos..].find(needle) {
                return Ok(Some(i));
            }
            if !self.refill()? {
                return Ok(None);
            }
        }
    }

    /// Consumes `len` bytes, updating line and column.
    fn advance(&mut self, len: usize) {
        for ch in self.buf[self.pos..self.pos + len].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += len;
    }

    /// Copies out and consumes `len` bytes.
    fn take(&mut self, len: usize) -> String {
        let s = self.buf[self.pos..self.pos + len].to_string();
        self.advance(len);
        s
    }

    /// Drops the consumed prefix once it grows past the threshold.
    fn compact(&mut self) {
        if self.pos > COMPACT_THRESHOLD {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }

    /// Consumes everything left so the next call reports end of stream.
    /// Used on unterminated constructs to guarantee forward progress.
    fn drain_to_end(&mut self) {
        let len = self.buf.len() - self.pos;
        self.advance(len);
    }

    fn syntax(&self, message: impl Into<String>) -> Error {
        Error::syntax(message, self.line, self.column)
    }

    /// Current source line, exposed for diagnostics.
    pub fn line(&self) -> u32 {
        self.line
    }

    // -- Token scanning --

    /// Returns the next token, or `Token::Eof` at end of stream.
    pub fn next_token(&mut self) -> Result<Token> {
        self.compact();

        let first = match self.peek_at(0)? {
            Some(b) => b,
            None => return Ok(Token::Eof),
        };
        if first != b'<' {
            return self.read_text();
        }

        match self.peek_at(1)? {
            Some(b'!') => {
                if self.starts_with("<!--")? {
                    self.read_comment()
                } else if self.starts_with("<![CDATA[")? {
                    self.read_cdata()
                } else {
                    self.read_directive()
                }
            }
            Some(b'?') => self.read_pi(),
            Some(b'/') => self.read_end_tag(),
            Some(b) if is_name_start(b) => self.read_start_tag(),
            Some(_) | None => {
                if self.lenient {
                    // Stray '<' becomes literal text.
                    self.advance(1);
                    Ok(Token::Text("<".to_string()))
                } else {
                    self.advance(1);
                    Err(self.syntax("expected element name after '<'"))
                }
            }
        }
    }

    fn starts_with(&mut self, prefix: &str) -> Result<bool> {
        if !self.ensure(prefix.len())? {
            return Ok(false);
        }
        Ok(self.buf[self.pos..].starts_with(prefix))
    }

    fn read_text(&mut self) -> Result<Token> {
        let raw = match self.find("<")? {
            Some(offset) => self.take(offset),
            None => {
                let len = self.buf.len() - self.pos;
                self.take(len)
            }
        };
        let decoded = self.decode_entities(&raw)?;
        Ok(Token::Text(decoded))
    }

    fn read_comment(&mut self) -> Result<Token> {
        self.advance(4); // <!--
        match self.find("-->")? {
            Some(offset) => {
                let content = self.take(offset);
                self.advance(3);
                Ok(Token::Comment(content))
            }
            None => {
                self.drain_to_end();
                Err(self.syntax("unterminated comment"))
            }
        }
    }

    fn read_cdata(&mut self) -> Result<Token> {
        self.advance(9); // <![CDATA[
        match self.find("]]>")? {
            Some(offset) => {
                let content = self.take(offset);
                self.advance(3);
                Ok(Token::CData(content))
            }
            None => {
                self.drain_to_end();
                Err(self.syntax("unterminated CDATA section"))
            }
        }
    }

    fn read_pi(&mut self) -> Result<Token> {
        self.advance(2); // <?
        match self.find("?>")? {
            Some(offset) => {
                let content = self.take(offset);
                self.advance(2);
                let (target, data) = match content.find(|c: char| c.is_ascii_whitespace()) {
                    Some(ws) => (content[..ws].to_string(), content[ws + 1..].to_string()),
                    None => (content, String::new()),
                };
                Ok(Token::Pi { target, data })
            }
            None => {
                self.drain_to_end();
                Err(self.syntax("unterminated processing instruction"))
            }
        }
    }

    /// Reads `<!...>` (DOCTYPE and friends). The internal subset may nest
    /// `<!ENTITY ...>` declarations inside `[ ... ]`, so `>` only closes
    /// the directive at bracket depth zero and outside quotes.
    fn read_directive(&mut self) -> Result<Token> {
        self.advance(2); // <!
        let mut offset = 0usize;
        let mut bracket_depth = 0u32;
        let mut quote: Option<u8> = None;
        loop {
            let b = match self.peek_at(offset)? {
                Some(b) => b,
                None => {
                    self.drain_to_end();
                    return Err(self.syntax("unterminated directive"));
                }
            };
            match (quote, b) {
                (Some(q), _) if b == q => quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => quote = Some(b),
                (None, b'[') => bracket_depth += 1,
                (None, b']') => bracket_depth = bracket_depth.saturating_sub(1),
                (None, b'>') if bracket_depth == 0 => break,
                _ => {}
            }
            offset += 1;
        }
        let content = self.take(offset);
        self.advance(1); // >
        self.register_subset_entities(&content);
        Ok(Token::Directive(content))
    }

    /// Harvests `<!ENTITY name "value">` declarations from a DOCTYPE
    /// internal subset so general entity references resolve in strict
    /// mode. Parameter and external (SYSTEM/PUBLIC) entities are skipped.
    fn register_subset_entities(&mut self, directive: &str) {
        let mut rest = directive;
        while let Some(at) = rest.find("<!ENTITY") {
            rest = &rest[at + "<!ENTITY".len()..];
            let decl = rest.trim_start();
            if decl.starts_with('%') {
                continue;
            }
            let name_end = match decl.find(|c: char| c.is_ascii_whitespace()) {
                Some(i) => i,
                None => continue,
            };
            let name = &decl[..name_end];
            let after = decl[name_end..].trim_start();
            if after.starts_with("SYSTEM") || after.starts_with("PUBLIC") {
                continue;
            }
            let mut chars = after.chars();
            let Some(q) = chars.next() else { continue };
            if q != '"' && q != '\'' {
                continue;
            }
            let value: String = chars.take_while(|&c| c != q).collect();
            self.entities.insert(name.to_string(), value);
        }
    }

    fn read_end_tag(&mut self) -> Result<Token> {
        self.advance(2); // </
        let name = self.scan_name()?;
        self.skip_whitespace()?;
        match self.peek_at(0)? {
            Some(b'>') => self.advance(1),
            _ => {
                if !self.lenient {
                    self.drain_to_end();
                    return Err(self.syntax(format!("malformed end tag </{name}")));
                }
                // Skip to the closing bracket.
                if let Some(offset) = self.find(">")? {
                    self.advance(offset + 1);
                } else {
                    self.drain_to_end();
                }
            }
        }
        if self.ns_stack.len() > 1 {
            self.ns_stack.pop();
        }
        Ok(Token::EndElement { name })
    }

    #[allow(clippy::too_many_lines)]
    fn read_start_tag(&mut self) -> Result<Token> {
        self.advance(1); // <
        let raw_name = self.scan_name()?;
        let mut raw_attributes: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace()?;
            match self.peek_at(0)? {
                Some(b'>') => {
                    self.advance(1);
                    break;
                }
                Some(b'/') => {
                    self.advance(1);
                    match self.peek_at(0)? {
                        Some(b'>') => {
                            self.advance(1);
                            self_closing = true;
                            break;
                        }
                        _ if self.lenient => continue,
                        _ => {
                            return Err(self.syntax("expected '>' after '/'"));
                        }
                    }
                }
                Some(b) if is_name_start(b) => {
                    let attr_name = self.scan_name()?;
                    self.skip_whitespace()?;
                    if self.peek_at(0)? == Some(b'=') {
                        self.advance(1);
                        self.skip_whitespace()?;
                        let value = self.scan_attr_value()?;
                        raw_attributes.push((attr_name, value));
                    } else if self.lenient {
                        // HTML boolean attribute: <input disabled>
                        raw_attributes.push((attr_name, String::new()));
                    } else {
                        return Err(self.syntax(format!("attribute {attr_name} missing value")));
                    }
                }
                Some(b) => {
                    if self.lenient {
                        self.advance(1);
                        continue;
                    }
                    self.advance(1);
                    return Err(self.syntax(format!("unexpected '{}' in tag", b as char)));
                }
                None => {
                    return Err(self.syntax(format!("unexpected end of input in <{raw_name}")));
                }
            }
        }

        // Bindings declared on this element apply to the element itself.
        let mut scope = match self.ns_stack.last() {
            Some(top) => top.clone(),
            None => HashMap::new(),
        };
        for (name, value) in &raw_attributes {
            if name == "xmlns" {
                scope.insert(String::new(), value.clone());
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                scope.insert(prefix.to_string(), value.clone());
            }
        }

        let name = resolve_name(&raw_name, &scope, true);
        let attributes = raw_attributes
            .into_iter()
            .map(|(raw, value)| {
                if raw == "xmlns" || raw.starts_with("xmlns:") {
                    // Namespace declarations survive as ordinary
                    // attributes so documents round-trip.
                    (
                        Name {
                            local: raw,
                            namespace: None,
                        },
                        value,
                    )
                } else {
                    (resolve_name(&raw, &scope, false), value)
                }
            })
            .collect();

        if self.lenient && !self_closing && is_void_tag(&name.local) {
            self_closing = true;
        }
        if !self_closing {
            self.ns_stack.push(scope);
        }

        Ok(Token::StartElement {
            name,
            attributes,
            self_closing,
        })
    }

    /// Scans a tag or attribute name at the current position.
    fn scan_name(&mut self) -> Result<String> {
        let mut len = 0usize;
        loop {
            match self.peek_at(len)? {
                Some(b) if is_name_byte(b) => len += 1,
                _ => break,
            }
        }
        if len == 0 {
            return Err(self.syntax("expected name"));
        }
        Ok(self.take(len))
    }

    /// Scans an attribute value: quoted normally, or a bare token in
    /// lenient mode.
    fn scan_attr_value(&mut self) -> Result<String> {
        match self.peek_at(0)? {
            Some(q @ (b'"' | b'\'')) => {
                self.advance(1);
                let quote = if q == b'"' { "\"" } else { "'" };
                match self.find(quote)? {
                    Some(offset) => {
                        let raw = self.take(offset);
                        self.advance(1);
                        self.decode_entities(&raw)
                    }
                    None => {
                        self.drain_to_end();
                        Err(self.syntax("unterminated attribute value"))
                    }
                }
            }
            Some(_) if self.lenient => {
                // Unquoted value: read until whitespace or tag end.
                let mut len = 0usize;
                loop {
                    match self.peek_at(len)? {
                        Some(b) if !b.is_ascii_whitespace() && b != b'>' && b != b'/' => len += 1,
                        _ => break,
                    }
                }
                let raw = self.take(len);
                self.decode_entities(&raw)
            }
            _ => Err(self.syntax("expected quoted attribute value")),
        }
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        loop {
            match self.peek_at(0)? {
                Some(b) if b.is_ascii_whitespace() => self.advance(1),
                _ => return Ok(()),
            }
        }
    }

    // -- Entity resolution --

    /// Decodes entity references in text and attribute values.
    ///
    /// Strict mode resolves the five XML builtins, numeric references,
    /// and internal-subset declarations, and rejects everything else.
    /// Lenient mode additionally resolves a set of HTML named entities
    /// and passes unknown references through literally.
    fn decode_entities(&mut self, raw: &str) -> Result<String> {
        if !raw.contains('&') {
            return Ok(raw.to_string());
        }
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            let after = &rest[amp + 1..];
            // An entity name is short; cap the scan so a bare '&' in soup
            // input cannot send us hunting across the whole document.
            let semi = after
                .char_indices()
                .take(32)
                .find(|&(_, c)| c == ';')
                .map(|(i, _)| i);
            match semi {
                Some(end) => {
                    let entity = &after[..end];
                    match self.resolve_entity(entity) {
                        Some(replacement) => {
                            out.push_str(&replacement);
                            rest = &after[end + 1..];
                        }
                        None if self.lenient => {
                            out.push('&');
                            rest = after;
                        }
                        None => {
                            return Err(self.syntax(format!("undefined entity &{entity};")));
                        }
                    }
                }
                None if self.lenient => {
                    out.push('&');
                    rest = after;
                }
                None => {
                    return Err(self.syntax("unterminated entity reference"));
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    fn resolve_entity(&self, entity: &str) -> Option<String> {
        match entity {
            "amp" => return Some("&".to_string()),
            "lt" => return Some("<".to_string()),
            "gt" => return Some(">".to_string()),
            "apos" => return Some("'".to_string()),
            "quot" => return Some("\"".to_string()),
            _ => {}
        }
        if let Some(code) = entity.strip_prefix('#') {
            let value = if let Some(hex) = code.strip_prefix('x').or_else(|| code.strip_prefix('X'))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                code.parse::<u32>().ok()?
            };
            return char::from_u32(value).map(String::from);
        }
        if let Some(value) = self.entities.get(entity) {
            return Some(value.clone());
        }
        if self.lenient {
            if let Some((_, replacement)) = HTML_ENTITIES.iter().find(|(name, _)| *name == entity)
            {
                return Some((*replacement).to_string());
            }
        }
        None
    }
}

/// Splits `prefix:local` and resolves the namespace against the scope.
/// The default namespace applies to elements only, never attributes.
fn resolve_name(raw: &str, scope: &HashMap<String, String>, is_element: bool) -> Name {
    if let Some((prefix, local)) = raw.split_once(':') {
        if prefix.is_empty() || local.is_empty() {
            return Name {
                local: raw.to_string(),
                namespace: None,
            };
        }
        let namespace = scope
            .get(prefix)
            .cloned()
            .unwrap_or_else(|| prefix.to_string());
        return Name {
            local: local.to_string(),
            namespace: Some(namespace),
        };
    }
    let namespace = if is_element {
        scope.get("").filter(|url| !url.is_empty()).cloned()
    } else {
        None
    };
    Name {
        local: raw.to_string(),
        namespace,
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':' || b >= 0x80
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':') || b >= 0x80
}
