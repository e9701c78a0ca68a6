//! The tokenizing parser.
//!
//! [`parse`] drives the incremental tokenizer through a stack of open
//! elements, assembling an [`OrderedMap`] per element: attributes become
//! `@name` keys, character data lands in `#text` (and, in document order,
//! `#seq`), comments/PIs/directives accumulate in their metadata
//! sequences, and a closed element is simplified to a scalar when text was
//! its only content. Repeated children are promoted to sequences in
//! document order.
//!
//! Behavior is driven by [`Options`], a builder shared with the encoder:
//!
//! ```
//! use xmlmap::{parse_with_options, Options};
//!
//! let opts = Options::default().force_array(["book"]);
//! let tree = parse_with_options(
//!     "<library><book>One</book></library>".as_bytes(),
//!     &opts,
//! ).unwrap();
//! assert_eq!(tree.list("library/book").len(), 1);
//! ```

pub(crate) mod input;
mod xml;

pub(crate) use xml::Assembler;

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::map::{OrderedMap, Value};
use crate::sanitize::sanitize_soup;

use input::{Token, Tokenizer};

/// A transformation hook applied to raw scalar values by name.
pub type ValueHook = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Parser and encoder configuration.
///
/// Use the builder pattern to configure options:
///
/// ```
/// use xmlmap::Options;
///
/// let opts = Options::default()
///     .force_array(["item", "entry"])
///     .register_namespace("ds", "http://www.w3.org/2000/09/xmldsig#")
///     .legacy_charsets(true);
/// ```
pub struct Options {
    /// Element names that always parse as sequences, even when they occur
    /// exactly once.
    pub(crate) force_array: HashSet<String>,
    /// Namespace URL to display alias. An element or attribute in a
    /// registered namespace gets the key `alias:localName`.
    pub(crate) namespaces: HashMap<String, String>,
    /// Per-name scalar transformation hooks.
    pub(crate) value_hooks: HashMap<String, ValueHook>,
    /// Tolerant tokenization: recover from malformed constructs,
    /// auto-close void tags, resolve HTML entities.
    pub(crate) lenient: bool,
    /// Infer bool/int/float types from scalar text.
    pub(crate) infer_types: bool,
    /// Soup normalization: lowercase names and run the raw-text sanitizer.
    pub(crate) soup: bool,
    /// Translate legacy single-byte charsets declared by the document.
    pub(crate) legacy_charsets: bool,
    /// Record the `#seq` mixed-content document-order view.
    pub(crate) retain_seq: bool,
    /// Indent encoder output.
    pub(crate) pretty: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            force_array: HashSet::new(),
            namespaces: HashMap::new(),
            value_hooks: HashMap::new(),
            lenient: false,
            infer_types: false,
            soup: false,
            legacy_charsets: false,
            retain_seq: true,
            pretty: false,
        }
    }
}

impl Clone for Options {
    fn clone(&self) -> Self {
        Self {
            force_array: self.force_array.clone(),
            namespaces: self.namespaces.clone(),
            value_hooks: self.value_hooks.clone(),
            lenient: self.lenient,
            infer_types: self.infer_types,
            soup: self.soup,
            legacy_charsets: self.legacy_charsets,
            retain_seq: self.retain_seq,
            pretty: self.pretty,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("force_array", &self.force_array)
            .field("namespaces", &self.namespaces)
            .field("value_hooks", &self.value_hooks.keys())
            .field("lenient", &self.lenient)
            .field("infer_types", &self.infer_types)
            .field("soup", &self.soup)
            .field("legacy_charsets", &self.legacy_charsets)
            .field("retain_seq", &self.retain_seq)
            .field("pretty", &self.pretty)
            .finish()
    }
}

impl Options {
    /// Forces the named elements to parse as sequences even when they
    /// occur exactly once, removing the single-vs-list ambiguity for
    /// downstream consumers.
    #[must_use]
    pub fn force_array<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_array.extend(names.into_iter().map(Into::into));
        self
    }

    /// Registers a display alias for a namespace URL. Elements and
    /// attributes in that namespace get `alias:localName` keys; on encode
    /// the registered pairs are injected as `xmlns:alias` declarations at
    /// the root.
    #[must_use]
    pub fn register_namespace(mut self, alias: impl Into<String>, url: impl Into<String>) -> Self {
        self.namespaces.insert(url.into(), alias.into());
        self
    }

    /// Registers a transformation hook for a tag or attribute name. The
    /// hook replaces the raw string during element simplification and
    /// attribute ingestion. Parse dates, decode custom formats, decrypt
    /// fields on the fly.
    #[must_use]
    pub fn with_value_hook(
        mut self,
        name: impl Into<String>,
        hook: impl Fn(&str) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.value_hooks.insert(name.into(), Arc::new(hook));
        self
    }

    /// Enables the aggressive dirty-HTML configuration: type inference,
    /// lenient tokenization, soup normalization (lowercased names plus
    /// the raw-text sanitizer), and void-element auto-close.
    #[must_use]
    pub fn experimental(mut self, yes: bool) -> Self {
        self.infer_types = yes;
        self.lenient = yes;
        self.soup = yes;
        self
    }

    /// Enables translation of legacy single-byte charsets
    /// (ISO-8859-1 / Windows-1252) declared by the document.
    #[must_use]
    pub fn legacy_charsets(mut self, yes: bool) -> Self {
        self.legacy_charsets = yes;
        self
    }

    /// Enables or disables the `#seq` mixed-content view (on by default).
    /// When disabled, deep text extraction falls back to recursive
    /// concatenation.
    #[must_use]
    pub fn retain_seq(mut self, yes: bool) -> Self {
        self.retain_seq = yes;
        self
    }

    /// Enables indented encoder output.
    #[must_use]
    pub fn pretty(mut self, yes: bool) -> Self {
        self.pretty = yes;
        self
    }

    pub(crate) fn hook_for(&self, name: &str) -> Option<&ValueHook> {
        self.value_hooks.get(name)
    }
}

/// Reads the entire XML input and returns the assembled tree.
///
/// # Errors
///
/// Returns [`Error::Syntax`] for malformed input, [`Error::UnsupportedCharset`]
/// for unknown declared encodings, and propagates reader I/O errors.
///
/// # Examples
///
/// ```
/// use xmlmap::parse;
///
/// let tree = parse("<order><id>7</id></order>".as_bytes()).unwrap();
/// assert_eq!(tree.string("order/id"), "7");
/// ```
pub fn parse<R: Read>(reader: R) -> Result<OrderedMap> {
    parse_with_options(reader, &Options::default())
}

/// Reads the entire XML input with the given options.
///
/// In soup mode the input is first run through the raw-text sanitizer,
/// which requires buffering the document; all other configurations stream
/// through the incremental tokenizer.
///
/// # Errors
///
/// Same as [`parse`]; in lenient mode token errors after the declaration
/// are swallowed and parsing continues.
pub fn parse_with_options<R: Read>(mut reader: R, options: &Options) -> Result<OrderedMap> {
    if options.soup {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let clean = sanitize_soup(&bytes);
        let tokenizer = Tokenizer::new(
            Cursor::new(clean),
            options.lenient,
            options.legacy_charsets,
        );
        run(tokenizer, options)
    } else {
        let tokenizer = Tokenizer::new(reader, options.lenient, options.legacy_charsets);
        run(tokenizer, options)
    }
}

/// Parses from an in-memory string.
///
/// # Errors
///
/// Same as [`parse`].
pub fn parse_str(input: &str) -> Result<OrderedMap> {
    parse(input.as_bytes())
}

fn run<R: Read>(mut tokenizer: Tokenizer<R>, options: &Options) -> Result<OrderedMap> {
    let mut assembler = Assembler::new(options);
    loop {
        match tokenizer.next_token() {
            Ok(Token::Eof) => break,
            Ok(token) => assembler.apply(token)?,
            // I/O and charset failures are fatal even in lenient mode;
            // retrying them cannot make progress.
            Err(err @ (Error::Io(_) | Error::UnsupportedCharset(_))) => return Err(err),
            Err(err) => {
                if options.lenient {
                    tracing::debug!(error = %err, "swallowed token error in lenient mode");
                    continue;
                }
                return Err(err);
            }
        }
    }
    if assembler.depth() > 0 {
        if options.lenient {
            assembler.close_all();
        } else {
            return Err(Error::syntax(
                "unexpected end of input: unclosed element",
                tokenizer.line(),
                1,
            ));
        }
    }
    Ok(assembler.finish())
}
