//! # xmlmap
//!
//! A schemaless XML toolkit for enterprise integration. Documents are read
//! into an insertion-ordered map model that round-trips element and
//! attribute order, queried with a slash-path language, and written back
//! deterministically, including a C14N-style canonical form suitable for
//! digital-signature digests. Large documents stream through a bounded
//! producer/consumer decoder without materializing a tree.
//!
//! ## Quick Start
//!
//! ```
//! use xmlmap::{marshal, parse_str};
//!
//! let tree = parse_str(r#"<library><book id="1">The Little Prince</book></library>"#)
//!     .unwrap();
//! assert_eq!(tree.query("library/book/#text").unwrap().as_str(),
//!            Some("The Little Prince"));
//! assert_eq!(tree.query("library/book/@id").unwrap().as_str(), Some("1"));
//!
//! // Re-serialization preserves document order.
//! let xml = marshal(&tree).unwrap();
//! assert_eq!(xml, r#"<library><book id="1">The Little Prince</book></library>"#);
//! ```
//!
//! ## The ordered model
//!
//! Each element is an [`OrderedMap`]: attributes are `@name` keys, text is
//! `#text`, children are everything else, and a repeated child becomes a
//! [`Value::List`] in document order. Trees are also built fluently:
//!
//! ```
//! use xmlmap::{marshal, OrderedMap};
//!
//! let mut order = OrderedMap::new();
//! order.set_path("Order/Customer/@id", "C55");
//! order.set_path("Order/Customer/Name", "Alice");
//! assert!(marshal(&order).unwrap().starts_with("<Order><Customer id=\"C55\">"));
//! ```

pub mod encoding;
pub mod error;
pub mod map;
pub mod parser;
pub mod query;
pub mod sanitize;
pub mod serial;
pub mod stream;

// Re-export primary types at the crate root for convenience.
pub use error::{Error, Result, SourceLocation};
pub use map::{from_value, OrderedMap, Value};
pub use parser::{parse, parse_str, parse_with_options, Options};
pub use query::{get, query, query_all, register_query_function, validate, Rule};
pub use serial::{c14n::canonicalize, encode, marshal, marshal_with_options};
pub use stream::{CancelToken, Stream, StreamIter};
