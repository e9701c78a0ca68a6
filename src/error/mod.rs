//! Error types and diagnostics.
//!
//! One public [`Error`] enum covers every failure the crate can surface.
//! Syntax errors carry a [`SourceLocation`] with line and column information
//! so callers can point at the offending input. Pure in-memory map
//! operations never fail; path and query operations return the recoverable
//! variants (`NotFound`, `TypeMismatch`, `IndexOutOfRange`, `ParentNotMap`,
//! `InvalidPredicate`). I/O errors from caller-supplied readers and writers
//! propagate unchanged.

use std::fmt;

use thiserror::Error;

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error type for parsing, serialization, and query operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed token in strict mode. In lenient (soup) mode these are
    /// swallowed and parsing continues.
    #[error("syntax error at {location}: {message}")]
    Syntax {
        /// Description of the malformed construct.
        message: String,
        /// Where in the source the error occurred.
        location: SourceLocation,
    },

    /// The declared charset is not in the supported translation table.
    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// The top-level map did not contain exactly one non-metadata key.
    #[error("document must have exactly one root element, found {0}")]
    RootCardinality(usize),

    /// A query or path lookup matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A value exists but cannot be coerced to the requested type.
    #[error("type mismatch at {path}: have {have}, want {want}")]
    TypeMismatch {
        /// The path that was queried.
        path: String,
        /// The type actually found.
        have: &'static str,
        /// The type the caller requested.
        want: &'static str,
    },

    /// A numeric index predicate fell outside the sequence bounds.
    #[error("index {index} out of range at {path}")]
    IndexOutOfRange {
        /// The path containing the index predicate.
        path: String,
        /// The out-of-range index.
        index: usize,
    },

    /// A path segment tried to descend through a non-map value.
    #[error("parent at {0} is not a map")]
    ParentNotMap(String),

    /// A rename target key already exists.
    #[error("key already exists: {0}")]
    KeyExists(String),

    /// A predicate expression could not be parsed.
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    /// A value could not be decoded into the requested target type.
    #[error("cannot decode value: {0}")]
    Deserialize(String),

    /// JSON conversion failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An I/O error from a caller-supplied reader or writer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a syntax error at the given line and column.
    pub(crate) fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        Error::Syntax {
            message: message.into(),
            location: SourceLocation { line, column },
        }
    }

}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
