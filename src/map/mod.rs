//! The insertion-ordered data model.
//!
//! [`OrderedMap`] represents an XML element's contents: attributes (`@name`
//! keys), character data (`#text` / `#cdata`), metadata sequences
//! (`#comments`, `#pi`, `#directive`, `#seq`), and child elements (every
//! other key). Iteration yields entries in insertion order, which is what
//! lets a parsed document round-trip with its element and attribute order
//! intact.
//!
//! [`Value`] is the sum type stored in map cells: scalars, nested maps,
//! and sequences. A child element that appears more than once is promoted
//! to a [`Value::List`] in document order.
//!
//! # Path addressing
//!
//! `set_path`/`get_path` navigate slash-separated key paths, creating
//! intermediate maps on write and returning `None` on the first missing
//! segment on read:
//!
//! ```
//! use xmlmap::OrderedMap;
//!
//! let mut order = OrderedMap::new();
//! order.set_path("Customer/@id", "C55");
//! order.set_path("Customer/Name", "Alice");
//! order.set_path("ID", "1001");
//!
//! assert_eq!(order.string("Customer/Name"), "Alice");
//! assert_eq!(order.int("ID"), 1001);
//! ```

mod de;

pub use de::from_value;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Error, Result};

/// Returns `true` for `#`-prefixed metadata keys (`#text`, `#seq`, ...).
pub(crate) fn is_metadata_key(key: &str) -> bool {
    key.starts_with('#')
}

/// Returns `true` for `@`-prefixed attribute keys.
pub(crate) fn is_attribute_key(key: &str) -> bool {
    key.starts_with('@')
}

/// A dynamically-typed value stored in an [`OrderedMap`] cell.
///
/// Scalars cover the leaves produced by parsing and by value hooks; `Map`
/// and `List` are the branch shapes. `Null` doubles as the "absent"
/// sentinel for lookups that found nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent or empty value.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Text scalar.
    String(String),
    /// Timestamp scalar, produced by value hooks or caller assignment.
    DateTime(DateTime<Utc>),
    /// A child element carrying attributes, children, or metadata.
    Map(OrderedMap),
    /// A repeated child element (document order) or a metadata sequence.
    List(Vec<Value>),
}

impl Value {
    /// Returns the type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Map(_) => "map",
            Value::List(_) => "list",
        }
    }

    /// Returns `true` if this value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for scalar (non-branch) values.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Map(_) | Value::List(_))
    }

    /// Returns the string slice if this is a text scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the map if this is a branch node.
    #[must_use]
    pub fn as_map(&self) -> Option<&OrderedMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Mutable variant of [`Value::as_map`].
    pub fn as_map_mut(&mut self) -> Option<&mut OrderedMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the sequence if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Mutable variant of [`Value::as_list`].
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Coerces to a string. Scalars stringify; `Null` is empty; branch
    /// values render as compact JSON.
    #[must_use]
    pub fn coerce_string(&self) -> String {
        self.to_string()
    }

    /// Coerces to an integer, returning 0 on absence or incompatibility.
    #[must_use]
    pub fn coerce_int(&self) -> i64 {
        match self {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => i64::from(*b),
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Coerces to a float, returning 0.0 on absence or incompatibility.
    #[must_use]
    pub fn coerce_float(&self) -> f64 {
        match self {
            Value::Float(f) => *f,
            Value::Int(i) => *i as f64,
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Coerces to a boolean. Strings `true`, `1`, `yes`, `on`
    /// (case-insensitive) are truthy; the integer 1 is truthy.
    #[must_use]
    pub fn coerce_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i == 1,
            Value::String(s) => {
                let s = s.to_ascii_lowercase();
                s == "true" || s == "1" || s == "yes" || s == "on"
            }
            _ => false,
        }
    }

    /// Parses a timestamp from this value, trying RFC 3339, `YYYY-MM-DD`,
    /// `YYYY-MM-DD HH:MM:SS`, and RFC 2822 in that order.
    #[must_use]
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        if let Value::DateTime(dt) = self {
            return Some(*dt);
        }
        let s = match self {
            Value::String(s) => s.trim(),
            _ => return None,
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Some(ndt.and_utc());
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.with_timezone(&Utc));
        }
        None
    }

    /// Wraps this value in a singleton list unless it already is one.
    /// `Null` becomes the empty list.
    #[must_use]
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::List(l) => l,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Extracts all text content recursively from this value.
    ///
    /// When the mixed-content `#seq` view is present it is walked verbatim,
    /// preserving the interleaving of text fragments and child elements.
    /// Otherwise text is gathered by recursive concatenation: `#text`
    /// first, then every child in insertion order. The result is trimmed.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Value::String(s) => out.push_str(s),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::DateTime(_) => {
                out.push_str(&self.to_string());
            }
            Value::Map(m) => {
                if let Some(Value::List(seq)) = m.get("#seq") {
                    for item in seq {
                        item.collect_text(out);
                    }
                    return;
                }
                if let Some(t) = m.get("#text") {
                    out.push_str(&t.to_string());
                }
                m.for_each(|k, v| {
                    if !is_attribute_key(k) && !is_metadata_key(k) {
                        v.collect_text(out);
                    }
                    true
                });
            }
            Value::List(items) => {
                for item in items {
                    item.collect_text(out);
                }
            }
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Value::Map(_) | Value::List(_) => {
                f.write_str(&serde_json::to_string(self).unwrap_or_default())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<OrderedMap> for Value {
    fn from(m: OrderedMap) -> Self {
        Value::Map(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

/// Plain unordered maps adapt at the boundary by inserting keys in
/// lexicographic order, so downstream iteration stays deterministic.
impl From<HashMap<String, Value>> for OrderedMap {
    fn from(plain: HashMap<String, Value>) -> Self {
        let mut keys: Vec<&String> = plain.keys().collect();
        keys.sort();
        let mut map = OrderedMap::with_capacity(keys.len());
        for k in keys {
            if let Some(v) = plain.get(k) {
                map.put(k.clone(), v.clone());
            }
        }
        map
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(plain: HashMap<String, Value>) -> Self {
        Value::Map(plain.into())
    }
}

/// An insertion-ordered map of string keys to [`Value`]s.
///
/// Keys iterate in insertion order; updating an existing key keeps its
/// position and removal closes the gap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedMap {
    entries: IndexMap<String, Value>,
}

impl OrderedMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Creates an empty map with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Sets `key` to `value`, appending the key if new and keeping its
    /// position if it already exists.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns the value for `key`, or `None` if absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Mutable variant of [`OrderedMap::get`].
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes `key` and its value, closing the positional gap.
    /// No-op if the key is absent.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the keys in current order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterates entries in order. The visitor returns `false` to stop early.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &Value) -> bool,
    {
        for (k, v) in &self.entries {
            if !visit(k, v) {
                break;
            }
        }
    }

    /// Iterator over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sets a value at a slash-separated path, creating intermediate maps
    /// as needed. An intermediate that exists but is not a map is replaced
    /// with a fresh map. Returns `self` for chaining.
    ///
    /// ```
    /// use xmlmap::OrderedMap;
    ///
    /// let mut m = OrderedMap::new();
    /// m.set_path("Body/Auth/Token", "abc123");
    /// assert_eq!(m.string("Body/Auth/Token"), "abc123");
    /// ```
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
        let parts: Vec<&str> = path.split('/').collect();
        let (last, intermediates) = match parts.split_last() {
            Some(split) => split,
            None => return self,
        };
        {
            let mut current: &mut OrderedMap = &mut *self;
            for key in intermediates {
                let slot = current
                    .entries
                    .entry((*key).to_string())
                    .or_insert_with(|| Value::Map(OrderedMap::new()));
                if !matches!(slot, Value::Map(_)) {
                    *slot = Value::Map(OrderedMap::new());
                }
                current = match slot {
                    Value::Map(m) => m,
                    // just normalized to a map above
                    _ => unreachable!(),
                };
            }
            current.put((*last).to_string(), value.into());
        }
        self
    }

    /// Navigates a slash-separated path, returning `None` on the first
    /// missing segment or non-map intermediate.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('/');
        let first = parts.next()?;
        let mut current = self.get(first)?;
        for key in parts {
            current = current.as_map()?.get(key)?;
        }
        Some(current)
    }

    /// Returns the map at `path`, or `None` if absent or not a map.
    #[must_use]
    pub fn get_node(&self, path: &str) -> Option<&OrderedMap> {
        self.get_path(path).and_then(Value::as_map)
    }

    /// Returns the elements at `path` as maps, normalized to one shape:
    /// a single map wraps into a singleton, a list yields its element
    /// items, and a simplified scalar element comes back as a map holding
    /// the scalar under `#text`. Absence yields an empty vector.
    #[must_use]
    pub fn list(&self, path: &str) -> Vec<OrderedMap> {
        fn element(value: &Value) -> Option<OrderedMap> {
            match value {
                Value::Map(m) => Some(m.clone()),
                Value::Null | Value::List(_) => None,
                scalar => {
                    let mut m = OrderedMap::new();
                    m.put("#text", scalar.clone());
                    Some(m)
                }
            }
        }
        match self.get_path(path) {
            Some(Value::List(items)) => items.iter().filter_map(element).collect(),
            Some(value) => element(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// String at `path`, coerced; empty string on absence.
    #[must_use]
    pub fn string(&self, path: &str) -> String {
        self.get_path(path).map(Value::coerce_string).unwrap_or_default()
    }

    /// Integer at `path`, coerced; 0 on absence or incompatibility.
    #[must_use]
    pub fn int(&self, path: &str) -> i64 {
        self.get_path(path).map(Value::coerce_int).unwrap_or(0)
    }

    /// Float at `path`, coerced; 0.0 on absence or incompatibility.
    #[must_use]
    pub fn float(&self, path: &str) -> f64 {
        self.get_path(path).map(Value::coerce_float).unwrap_or(0.0)
    }

    /// Boolean at `path`, coerced; `false` on absence or incompatibility.
    #[must_use]
    pub fn bool(&self, path: &str) -> bool {
        self.get_path(path).map(Value::coerce_bool).unwrap_or(false)
    }

    /// Timestamp at `path`; `None` on absence or unparseable input.
    #[must_use]
    pub fn time(&self, path: &str) -> Option<DateTime<Utc>> {
        self.get_path(path).and_then(Value::as_time)
    }

    /// Renames `old` to `new`, preserving the key's position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `old` is absent and
    /// [`Error::KeyExists`] if `new` is already present.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if self.entries.contains_key(new) {
            return Err(Error::KeyExists(new.to_string()));
        }
        let index = self
            .entries
            .get_index_of(old)
            .ok_or_else(|| Error::NotFound(old.to_string()))?;
        if let Some(value) = self.entries.shift_remove(old) {
            self.entries.shift_insert(index, new.to_string(), value);
        }
        Ok(())
    }

    /// Moves the value tree at `src` to `dst`. Equivalent to
    /// `get_path` + remove + `set_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `src` resolves to nothing and
    /// [`Error::ParentNotMap`] if an intermediate of `src` is not a map.
    pub fn move_path(&mut self, src: &str, dst: &str) -> Result<()> {
        let value = self.remove_path(src)?;
        self.set_path(dst, value);
        Ok(())
    }

    /// Removes and returns the value at a slash-separated path.
    fn remove_path(&mut self, path: &str) -> Result<Value> {
        let parts: Vec<&str> = path.split('/').collect();
        let (last, intermediates) = parts
            .split_last()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        let mut current: &mut OrderedMap = &mut *self;
        for (i, key) in intermediates.iter().enumerate() {
            current = match current.entries.get_mut(*key) {
                Some(Value::Map(m)) => m,
                Some(_) => return Err(Error::ParentNotMap(parts[..=i].join("/"))),
                None => return Err(Error::NotFound(path.to_string())),
            };
        }
        current
            .entries
            .shift_remove(*last)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    /// Reorders keys lexicographically.
    pub fn sort_keys(&mut self) {
        self.entries.sort_keys();
    }

    /// Overlays `other`'s entries onto this map: existing keys keep their
    /// position (values overwritten), new keys append.
    pub fn merge(&mut self, other: &OrderedMap) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    /// Emits the map as a JSON object literal preserving key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Pretty-printed variant of [`OrderedMap::to_json`], useful in logs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Runs a path query against this map. See [`crate::query_all`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPredicate`] for malformed predicates.
    pub fn query_all(&self, path: &str) -> Result<Vec<Value>> {
        crate::query::query_all_map(self, path)
    }

    /// Returns the first query result. See [`crate::query`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches.
    pub fn query(&self, path: &str) -> Result<Value> {
        crate::query::query_map(self, path)
    }

    /// Deep text extraction over the whole map. See [`Value::text`].
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        Value::collect_map_text(self, &mut out);
        out.trim().to_string()
    }
}

impl Value {
    fn collect_map_text(map: &OrderedMap, out: &mut String) {
        // Mirrors Value::collect_text for a borrowed map without cloning.
        if let Some(Value::List(seq)) = map.get("#seq") {
            for item in seq {
                item.collect_text(out);
            }
            return;
        }
        if let Some(t) = map.get("#text") {
            out.push_str(&t.to_string());
        }
        map.for_each(|k, v| {
            if !is_attribute_key(k) && !is_metadata_key(k) {
                v.collect_text(out);
            }
            true
        });
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            Value::Map(m) => m.serialize(serializer),
            Value::List(l) => l.serialize(serializer),
        }
    }
}

impl Serialize for OrderedMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_preserves_insertion_order() {
        let mut m = OrderedMap::new();
        m.put("Zebra", "Animal");
        m.put("Apple", "Fruit");
        m.put("Carrot", "Vegetable");
        assert_eq!(m.keys(), vec!["Zebra", "Apple", "Carrot"]);

        // Updating an existing key keeps its position.
        m.put("Apple", "Still a fruit");
        assert_eq!(m.keys(), vec!["Zebra", "Apple", "Carrot"]);
        assert_eq!(m.string("Apple"), "Still a fruit");
    }

    #[test]
    fn test_remove_closes_gap() {
        let mut m = OrderedMap::new();
        m.put("a", 1i64);
        m.put("b", 2i64);
        m.put("c", 3i64);
        m.remove("b");
        assert_eq!(m.keys(), vec!["a", "c"]);
        // Removing an absent key is a no-op.
        m.remove("missing");
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut m = OrderedMap::new();
        m.set_path("Order/Customer/@id", "C55")
            .set_path("Order/Customer/Name", "Alice")
            .set_path("Order/ID", "1001");

        assert_eq!(m.string("Order/Customer/@id"), "C55");
        assert_eq!(m.string("Order/Customer/Name"), "Alice");
        let order = m.get_node("Order").unwrap();
        assert_eq!(order.keys(), vec!["Customer", "ID"]);
    }

    #[test]
    fn test_set_path_replaces_scalar_intermediate() {
        let mut m = OrderedMap::new();
        m.put("a", "scalar");
        m.set_path("a/b", "deep");
        assert_eq!(m.string("a/b"), "deep");
    }

    #[test]
    fn test_get_path_missing_segments() {
        let mut m = OrderedMap::new();
        m.set_path("a/b", 1i64);
        assert!(m.get_path("a/missing").is_none());
        assert!(m.get_path("a/b/c").is_none()); // non-map intermediate
        assert!(m.get_path("missing").is_none());
    }

    #[test]
    fn test_typed_accessors_coerce() {
        let mut m = OrderedMap::new();
        m.put("n", "42");
        m.put("f", "2.5");
        m.put("t", "yes");
        m.put("i", 7i64);
        assert_eq!(m.int("n"), 42);
        assert_eq!(m.float("f"), 2.5);
        assert!(m.bool("t"));
        assert_eq!(m.string("i"), "7");
        assert_eq!(m.float("i"), 7.0);
        // Zero values on absence and incompatibility.
        assert_eq!(m.int("missing"), 0);
        assert_eq!(m.string("missing"), "");
        assert!(!m.bool("missing"));
    }

    #[test]
    fn test_list_shapes() {
        let mut inner = OrderedMap::new();
        inner.put("#text", "One");

        let mut m = OrderedMap::new();
        m.put("single", inner.clone());
        m.put(
            "many",
            Value::List(vec![
                Value::Map(inner.clone()),
                Value::String("noise".to_string()),
                Value::Map(inner),
            ]),
        );

        assert_eq!(m.list("single").len(), 1);
        // Scalar list items normalize to #text-carrying maps.
        let many = m.list("many");
        assert_eq!(many.len(), 3);
        assert_eq!(many[1].string("#text"), "noise");
        assert!(m.list("missing").is_empty());
    }

    #[test]
    fn test_rename_preserves_position() {
        let mut m = OrderedMap::new();
        m.put("a", 1i64);
        m.put("b", 2i64);
        m.put("c", 3i64);
        m.rename("b", "beta").unwrap();
        assert_eq!(m.keys(), vec!["a", "beta", "c"]);
        assert_eq!(m.int("beta"), 2);

        assert!(matches!(m.rename("beta", "a"), Err(Error::KeyExists(_))));
        assert!(matches!(m.rename("missing", "x"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_move_path() {
        let mut m = OrderedMap::new();
        m.set_path("a/b/c", "deep");
        m.move_path("a/b/c", "top").unwrap();
        assert_eq!(m.string("top"), "deep");
        assert!(m.get_path("a/b/c").is_none());

        assert!(matches!(m.move_path("a/b/c", "x"), Err(Error::NotFound(_))));
        m.put("scalar", 1i64);
        assert!(matches!(
            m.move_path("scalar/deep", "x"),
            Err(Error::ParentNotMap(_))
        ));
    }

    #[test]
    fn test_sort_keys_and_merge() {
        let mut m = OrderedMap::new();
        m.put("c", 3i64);
        m.put("a", 1i64);
        m.sort_keys();
        assert_eq!(m.keys(), vec!["a", "c"]);

        let mut other = OrderedMap::new();
        other.put("c", 30i64); // existing: keeps position
        other.put("b", 2i64); // new: appends
        m.merge(&other);
        assert_eq!(m.keys(), vec!["a", "c", "b"]);
        assert_eq!(m.int("c"), 30);
    }

    #[test]
    fn test_to_json_preserves_order() {
        let mut m = OrderedMap::new();
        m.put("z", 1i64);
        m.put("a", "two");
        m.put("nested", {
            let mut n = OrderedMap::new();
            n.put("y", true);
            n
        });
        assert_eq!(m.to_json().unwrap(), r#"{"z":1,"a":"two","nested":{"y":true}}"#);
    }

    #[test]
    fn test_plain_map_adapts_sorted() {
        let mut plain = HashMap::new();
        plain.insert("carrot".to_string(), Value::Int(3));
        plain.insert("apple".to_string(), Value::Int(1));
        plain.insert("banana".to_string(), Value::Int(2));
        let ordered: OrderedMap = plain.into();
        assert_eq!(ordered.keys(), vec!["apple", "banana", "carrot"]);
    }

    #[test]
    fn test_text_walks_seq_when_present() {
        let mut bold = OrderedMap::new();
        bold.put("#text", "stock");

        let mut p = OrderedMap::new();
        p.put("#text", "The is low");
        p.put("b", bold.clone());
        p.put(
            "#seq",
            Value::List(vec![
                Value::String("The ".to_string()),
                Value::Map(bold),
                Value::String(" is low".to_string()),
            ]),
        );

        assert_eq!(Value::Map(p).text(), "The stock is low");
    }

    #[test]
    fn test_text_recursive_fallback() {
        let mut inner = OrderedMap::new();
        inner.put("#text", "world");
        let mut m = OrderedMap::new();
        m.put("@attr", "skipped");
        m.put("#text", "hello ");
        m.put("child", inner);
        assert_eq!(m.text(), "hello world");
    }

    #[test]
    fn test_as_time_layouts() {
        assert!(Value::from("2024-03-01").as_time().is_some());
        assert!(Value::from("2024-03-01 10:30:00").as_time().is_some());
        assert!(Value::from("2024-03-01T10:30:00Z").as_time().is_some());
        assert!(Value::from("not a date").as_time().is_none());
    }

    #[test]
    fn test_for_each_early_exit() {
        let mut m = OrderedMap::new();
        m.put("a", 1i64);
        m.put("b", 2i64);
        m.put("c", 3i64);
        let mut seen = Vec::new();
        m.for_each(|k, _| {
            seen.push(k.to_string());
            k != "b"
        });
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_clone_is_deep_and_canonical_equal() {
        let mut m = OrderedMap::new();
        m.set_path("a/b", "x");
        let c = m.clone();
        assert_eq!(m, c);
    }
}
