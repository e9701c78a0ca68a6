//! Path queries over the data model.
//!
//! A query path is a slash-separated list of segments evaluated against a
//! live candidate list. Each segment transforms the list:
//!
//! - `library/book`: deep navigation through map keys
//! - `//error`: recursive descent for a name anywhere in the tree
//! - `users/user[0]`: sequence indexing
//! - `book[price<10]`, `user[role='admin']`, `user[id!=5]`: filters
//! - `book[contains(title, 'Go')]`, `user[starts-with(name, 'A')]`
//! - `items/*/sku`: wildcard over child elements
//! - `items/func:isNumeric/id`: registered key-predicate filters
//! - `items/#count`: cardinality of a sequence or map
//! - `book/title/#text`: explicit text access (scalars pass through)
//!
//! Sequences are never flattened by navigation alone; predicates and
//! wildcards iterate them explicitly. Missing data yields an empty result,
//! never an error; only a malformed predicate fails.

mod functions;
mod validate;

pub use functions::register_query_function;
pub use validate::{validate, Rule};

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::map::{from_value, is_attribute_key, is_metadata_key, OrderedMap, Value};

/// One evaluation candidate: a borrowed tree node, or a count synthesized
/// by `#count`.
enum Cand<'a> {
    Node(&'a Value),
    Count(i64),
}

/// Returns every node matching `path`, in document order.
///
/// Missing data yields an empty list.
///
/// # Errors
///
/// Returns [`Error::InvalidPredicate`] for malformed predicate syntax.
///
/// # Examples
///
/// ```
/// use xmlmap::parse_str;
///
/// let tree = parse_str(
///     "<store><book><price>8.95</price></book><book><price>22.99</price></book></store>"
/// ).unwrap();
/// let cheap = tree.query_all("store/book[price<10]").unwrap();
/// assert_eq!(cheap.len(), 1);
/// ```
pub fn query_all(data: &Value, path: &str) -> Result<Vec<Value>> {
    if path.is_empty() {
        return Ok(vec![data.clone()]);
    }
    if let Some(rest) = path.strip_prefix("//") {
        return descend_then(rest, |target, out| collect_recursive(data, target, out));
    }
    let mut cands = vec![Cand::Node(data)];
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        cands = apply_segment(cands, segment)?;
        if cands.is_empty() {
            return Ok(Vec::new());
        }
    }
    Ok(materialize(cands))
}

/// Returns the first node matching `path`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when nothing matches and
/// [`Error::InvalidPredicate`] for malformed predicates.
pub fn query(data: &Value, path: &str) -> Result<Value> {
    let mut results = query_all(data, path)?;
    if results.is_empty() {
        return Err(Error::NotFound(path.to_string()));
    }
    Ok(results.remove(0))
}

/// Returns the first match coerced into the requested type, widening
/// integers to floats and parsing numeric strings as needed.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when nothing matches and
/// [`Error::TypeMismatch`] when the value cannot satisfy the target type.
pub fn get<T: DeserializeOwned>(data: &Value, path: &str) -> Result<T> {
    let value = query(data, path)?;
    from_value(&value).map_err(|_| Error::TypeMismatch {
        path: path.to_string(),
        have: value.type_name(),
        want: std::any::type_name::<T>(),
    })
}

/// [`query_all`] seeded by a map root, used by the `OrderedMap` methods.
pub(crate) fn query_all_map(map: &OrderedMap, path: &str) -> Result<Vec<Value>> {
    if path.is_empty() {
        return Ok(vec![Value::Map(map.clone())]);
    }
    if let Some(rest) = path.strip_prefix("//") {
        return descend_then(rest, |target, out| {
            collect_recursive_map(map, target, out);
        });
    }
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = match segments.next() {
        Some(s) => s,
        None => return Ok(vec![Value::Map(map.clone())]),
    };
    let mut cands = apply_to_map(map, first)?;
    for segment in segments {
        cands = apply_segment(cands, segment)?;
        if cands.is_empty() {
            return Ok(Vec::new());
        }
    }
    Ok(materialize(cands))
}

pub(crate) fn query_map(map: &OrderedMap, path: &str) -> Result<Value> {
    let mut results = query_all_map(map, path)?;
    if results.is_empty() {
        return Err(Error::NotFound(path.to_string()));
    }
    Ok(results.remove(0))
}

fn materialize(cands: Vec<Cand<'_>>) -> Vec<Value> {
    cands
        .into_iter()
        .map(|c| match c {
            Cand::Node(v) => v.clone(),
            Cand::Count(n) => Value::Int(n),
        })
        .collect()
}

/// Runs a recursive-descent collection, then evaluates any remaining path
/// segments against the collected nodes.
fn descend_then<'a, F>(rest: &str, collect: F) -> Result<Vec<Value>>
where
    F: FnOnce(&str, &mut Vec<&'a Value>),
{
    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let target = match segments.next() {
        Some(s) => s,
        None => return Ok(Vec::new()),
    };
    let mut found: Vec<&Value> = Vec::new();
    collect(target, &mut found);
    let mut cands: Vec<Cand<'_>> = found.into_iter().map(Cand::Node).collect();
    for segment in segments {
        cands = apply_segment(cands, segment)?;
        if cands.is_empty() {
            return Ok(Vec::new());
        }
    }
    Ok(materialize(cands))
}

/// Depth-first name collection: direct children matching `target` are
/// collected, then every non-metadata child value is searched in turn.
fn collect_recursive<'a>(node: &'a Value, target: &str, out: &mut Vec<&'a Value>) {
    match node {
        Value::Map(map) => collect_recursive_map(map, target, out),
        Value::List(items) => {
            for item in items {
                collect_recursive(item, target, out);
            }
        }
        _ => {}
    }
}

fn collect_recursive_map<'a>(map: &'a OrderedMap, target: &str, out: &mut Vec<&'a Value>) {
    if let Some(found) = map.get(target) {
        out.push(found);
    }
    for (key, value) in map.iter() {
        if is_attribute_key(key) || is_metadata_key(key) {
            continue;
        }
        collect_recursive(value, target, out);
    }
}

/// Applies one segment to the whole candidate list.
fn apply_segment<'a>(cands: Vec<Cand<'a>>, segment: &str) -> Result<Vec<Cand<'a>>> {
    let mut next: Vec<Cand<'a>> = Vec::new();

    if segment == "#count" {
        for cand in &cands {
            if let Cand::Node(node) = cand {
                let count = match *node {
                    Value::List(items) => Some(items.len() as i64),
                    Value::Map(map) => Some(map.len() as i64),
                    _ => None,
                };
                if let Some(n) = count {
                    next.push(Cand::Count(n));
                }
            }
        }
        return Ok(next);
    }

    let parsed = Segment::parse(segment)?;
    for cand in &cands {
        match cand {
            Cand::Node(node) => {
                let node: &'a Value = *node;
                // A candidate that is a sequence is searched item by item.
                match node {
                    Value::List(items) => {
                        for item in items {
                            apply_to_node(item, &parsed, &mut next);
                        }
                    }
                    single => apply_to_node(single, &parsed, &mut next),
                }
            }
            // A synthesized count is a scalar: only #text passes it on.
            Cand::Count(n) => {
                if parsed.key == "#text" && parsed.predicate.is_none() {
                    next.push(Cand::Count(*n));
                }
            }
        }
    }
    Ok(next)
}

/// First-hop variant of [`apply_segment`] used when the root is a map.
fn apply_to_map<'a>(map: &'a OrderedMap, segment: &str) -> Result<Vec<Cand<'a>>> {
    if segment == "#count" {
        return Ok(vec![Cand::Count(map.len() as i64)]);
    }
    let parsed = Segment::parse(segment)?;
    let mut next = Vec::new();
    let mut selected = Vec::new();
    select_from_map(map, &parsed.key, &mut selected);
    for value in selected {
        parsed.apply_predicate(value, &mut next);
    }
    Ok(next)
}

fn apply_to_node<'a>(node: &'a Value, parsed: &Segment, next: &mut Vec<Cand<'a>>) {
    // Post-simplification leaves satisfy #text directly.
    if parsed.key == "#text" && node.is_scalar() && !node.is_null() {
        next.push(Cand::Node(node));
        return;
    }
    let map = match node {
        Value::Map(m) => m,
        _ => return,
    };
    let mut selected = Vec::new();
    select_from_map(map, &parsed.key, &mut selected);
    for value in selected {
        parsed.apply_predicate(value, next);
    }
}

/// Resolves a segment key against a map: direct lookup, `*` wildcard over
/// child elements, or a registered `func:` key-predicate.
fn select_from_map<'a>(map: &'a OrderedMap, key: &str, out: &mut Vec<&'a Value>) {
    if key == "*" {
        for (k, v) in map.iter() {
            if !is_attribute_key(k) && !is_metadata_key(k) {
                out.push(v);
            }
        }
        return;
    }
    if let Some(name) = key.strip_prefix("func:") {
        if let Some(predicate) = functions::lookup(name) {
            for (k, v) in map.iter() {
                if !is_attribute_key(k) && !is_metadata_key(k) && predicate(k) {
                    out.push(v);
                }
            }
        }
        return;
    }
    if let Some(value) = map.get(key) {
        out.push(value);
    }
}

// -- Segment and predicate parsing --

#[derive(Debug, PartialEq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, PartialEq)]
enum Predicate {
    /// `[3]`: select one item of a sequence.
    Index(usize),
    /// `[key op literal]`.
    Compare { key: String, op: Op, literal: String },
    /// `[contains(key, 'literal')]` / `[starts-with(key, 'literal')]`.
    Contains { key: String, literal: String },
    StartsWith { key: String, literal: String },
}

#[derive(Debug, PartialEq)]
struct Segment {
    key: String,
    predicate: Option<Predicate>,
}

impl Segment {
    fn parse(segment: &str) -> Result<Self> {
        let Some(open) = segment.find('[') else {
            return Ok(Self {
                key: segment.to_string(),
                predicate: None,
            });
        };
        if open == 0 || !segment.ends_with(']') {
            return Err(Error::InvalidPredicate(segment.to_string()));
        }
        let key = segment[..open].to_string();
        let inside = &segment[open + 1..segment.len() - 1];
        Ok(Self {
            key,
            predicate: Some(parse_predicate(inside, segment)?),
        })
    }

    /// Applies this segment's predicate to a selected value, pushing the
    /// surviving candidates.
    fn apply_predicate<'a>(&self, value: &'a Value, next: &mut Vec<Cand<'a>>) {
        match &self.predicate {
            None => next.push(Cand::Node(value)),
            Some(Predicate::Index(index)) => {
                if let Value::List(items) = value {
                    if let Some(item) = items.get(*index) {
                        next.push(Cand::Node(item));
                    }
                }
            }
            Some(filter) => match value {
                Value::List(items) => {
                    for item in items {
                        if matches_filter(item, filter) {
                            next.push(Cand::Node(item));
                        }
                    }
                }
                single => {
                    if matches_filter(single, filter) {
                        next.push(Cand::Node(single));
                    }
                }
            },
        }
    }
}

fn parse_predicate(inside: &str, segment: &str) -> Result<Predicate> {
    let invalid = || Error::InvalidPredicate(segment.to_string());

    // Function form: name(key, 'literal')
    if let Some(paren) = inside.find('(') {
        if !inside.ends_with(')') {
            return Err(invalid());
        }
        let name = inside[..paren].trim();
        let args: Vec<&str> = inside[paren + 1..inside.len() - 1].split(',').collect();
        let &[key, literal] = args.as_slice() else {
            return Err(invalid());
        };
        let key = key.trim().to_string();
        let literal = literal
            .trim()
            .trim_matches(|c| c == '\'' || c == '"')
            .to_string();
        return match name {
            "contains" => Ok(Predicate::Contains { key, literal }),
            "starts-with" => Ok(Predicate::StartsWith { key, literal }),
            _ => Err(invalid()),
        };
    }

    // Operator form. Multi-character operators are matched first.
    for (token, op) in [
        ("!=", Op::Ne),
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("=", Op::Eq),
        (">", Op::Gt),
        ("<", Op::Lt),
    ] {
        if let Some(at) = inside.find(token) {
            let key = inside[..at].trim().to_string();
            let literal = inside[at + token.len()..]
                .trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .to_string();
            if key.is_empty() {
                return Err(invalid());
            }
            return Ok(Predicate::Compare { key, op, literal });
        }
    }

    // Index form.
    inside
        .trim()
        .parse::<usize>()
        .map(Predicate::Index)
        .map_err(|_| invalid())
}

/// Resolves the filter key against an item (child key first, then the
/// `@`-prefixed attribute) and evaluates the condition. Equality compares
/// strings; relational operators compare as floats.
fn matches_filter(item: &Value, filter: &Predicate) -> bool {
    let (key, literal) = match filter {
        Predicate::Compare { key, literal, .. }
        | Predicate::Contains { key, literal }
        | Predicate::StartsWith { key, literal } => (key, literal),
        Predicate::Index(_) => return false,
    };

    let map = match item {
        Value::Map(m) => m,
        _ => return false,
    };
    let actual = map
        .get(key)
        .or_else(|| map.get(&format!("@{key}")))
        .map(Value::to_string);
    let Some(actual) = actual else {
        return false;
    };

    match filter {
        Predicate::Contains { .. } => actual.contains(literal.as_str()),
        Predicate::StartsWith { .. } => actual.starts_with(literal.as_str()),
        Predicate::Compare { op, .. } => match op {
            Op::Eq => actual == *literal,
            Op::Ne => actual != *literal,
            Op::Gt | Op::Lt | Op::Ge | Op::Le => {
                let (Ok(a), Ok(b)) = (actual.parse::<f64>(), literal.parse::<f64>()) else {
                    return false;
                };
                match op {
                    Op::Gt => a > b,
                    Op::Lt => a < b,
                    Op::Ge => a >= b,
                    Op::Le => a <= b,
                    Op::Eq | Op::Ne => false,
                }
            }
        },
        Predicate::Index(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    #[test]
    fn test_deep_navigation_and_text() {
        let tree =
            parse_str(r#"<library><book id="1">The Little Prince</book></library>"#).unwrap();
        let title = tree.query("library/book/#text").unwrap();
        assert_eq!(title, Value::String("The Little Prince".to_string()));
        let id = tree.query("library/book/@id").unwrap();
        assert_eq!(id, Value::String("1".to_string()));
    }

    #[test]
    fn test_text_passes_through_scalar() {
        let tree = parse_str("<a><b>plain</b></a>").unwrap();
        // b simplified to a scalar; #text still reaches it.
        assert_eq!(
            tree.query("a/b/#text").unwrap(),
            Value::String("plain".to_string())
        );
    }

    #[test]
    fn test_numeric_filter() {
        let tree = parse_str(
            "<store><book><price>8.95</price></book><book><price>22.99</price></book></store>",
        )
        .unwrap();
        let cheap = tree.query_all("store/book[price<10]").unwrap();
        assert_eq!(cheap.len(), 1);
        let Value::Map(book) = &cheap[0] else {
            panic!("expected map");
        };
        assert_eq!(book.float("price"), 8.95);
    }

    #[test]
    fn test_equality_and_inequality_filters() {
        let tree = parse_str(
            r#"<users><user role="admin"><id>1</id></user><user role="guest"><id>2</id></user></users>"#,
        )
        .unwrap();
        let admins = tree.query_all("users/user[role='admin']").unwrap();
        assert_eq!(admins.len(), 1);
        let not_one = tree.query_all("users/user[id!=1]").unwrap();
        assert_eq!(not_one.len(), 1);
        // Attribute lookup falls back from the bare key.
        let by_attr = tree.query_all("users/user[@role=guest]").unwrap();
        assert_eq!(by_attr.len(), 1);
    }

    #[test]
    fn test_index_predicate() {
        let tree = parse_str("<l><it>a</it><it>b</it><it>c</it></l>").unwrap();
        assert_eq!(
            tree.query("l/it[1]").unwrap(),
            Value::String("b".to_string())
        );
        assert!(tree.query_all("l/it[9]").unwrap().is_empty());
    }

    #[test]
    fn test_string_functions() {
        let tree = parse_str(
            "<lib><book><title>Go in Action</title></book><book><title>Rust here</title></book></lib>",
        )
        .unwrap();
        let go = tree.query_all("lib/book[contains(title, 'Go')]").unwrap();
        assert_eq!(go.len(), 1);
        let r = tree.query_all("lib/book[starts-with(title, 'Rust')]").unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_wildcard_iterates_children() {
        let tree = parse_str(
            "<items><a><sku>1</sku></a><b><sku>2</sku></b><c><sku>3</sku></c></items>",
        )
        .unwrap();
        let skus = tree.query_all("items/*/sku").unwrap();
        assert_eq!(skus.len(), 3);
    }

    #[test]
    fn test_count_aggregation() {
        let tree = parse_str("<l><it>a</it><it>b</it><it>c</it></l>").unwrap();
        assert_eq!(tree.query("l/it/#count").unwrap(), Value::Int(3));
        // Map entry count.
        let tree2 = parse_str("<m><a>1</a><b>2</b></m>").unwrap();
        assert_eq!(tree2.query("m/#count").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_recursive_descent() {
        let tree = parse_str(
            "<root><a><error>one</error></a><b><c><error>two</error></c></b></root>",
        )
        .unwrap();
        let errors = tree.query_all("//error").unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], Value::String("one".to_string()));
        assert_eq!(errors[1], Value::String("two".to_string()));
    }

    #[test]
    fn test_recursive_descent_with_tail() {
        let tree = parse_str(
            "<r><sec><book><title>T1</title></book></sec><sec><book><title>T2</title></book></sec></r>",
        )
        .unwrap();
        let titles = tree.query_all("//book/title").unwrap();
        assert_eq!(titles.len(), 2);
    }

    #[test]
    fn test_sequences_not_flattened() {
        let tree = parse_str("<l><it>a</it><it>b</it></l>").unwrap();
        // Navigating to a sequence yields the sequence as one result.
        let results = tree.query_all("l/it").unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], Value::List(items) if items.len() == 2));
    }

    #[test]
    fn test_missing_yields_empty_not_error() {
        let tree = parse_str("<a><b>x</b></a>").unwrap();
        assert!(tree.query_all("a/zzz/deep").unwrap().is_empty());
        assert!(matches!(
            tree.query("a/zzz"),
            Err(Error::NotFound(path)) if path == "a/zzz"
        ));
    }

    #[test]
    fn test_invalid_predicate_errors() {
        let tree = parse_str("<a><b>x</b></a>").unwrap();
        assert!(matches!(
            tree.query_all("a/b[not a predicate]"),
            Err(Error::InvalidPredicate(_))
        ));
        assert!(matches!(
            tree.query_all("a/b[frobnicate(x, 'y')]"),
            Err(Error::InvalidPredicate(_))
        ));
    }

    #[test]
    fn test_typed_get() {
        let tree = parse_str("<o><id>7</id><total>50.5</total></o>").unwrap();
        let root = Value::Map(tree);
        assert_eq!(get::<i64>(&root, "o/id").unwrap(), 7);
        assert_eq!(get::<f64>(&root, "o/id").unwrap(), 7.0); // widening
        assert_eq!(get::<f64>(&root, "o/total").unwrap(), 50.5);
        assert_eq!(get::<String>(&root, "o/total").unwrap(), "50.5");
        assert!(matches!(
            get::<i64>(&root, "o/total"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_path_returns_input() {
        let tree = parse_str("<a>x</a>").unwrap();
        let results = tree.query_all("").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_custom_function_segment() {
        let tree = parse_str(
            "<items><i123><v>num</v></i123><abc><v>alpha</v></abc></items>",
        )
        .unwrap();
        let alpha = tree.query_all("items/func:isAlpha/v").unwrap();
        assert_eq!(alpha, vec![Value::String("alpha".to_string())]);
    }
}
