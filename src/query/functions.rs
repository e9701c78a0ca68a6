//! The key-predicate registry.
//!
//! `func:name` path segments filter map keys through registered
//! predicates. The registry is process-wide behind a readers-writer lock:
//! adapters register their predicates once at startup, and queries take
//! the read side per segment. Built-ins install on first use.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// A key filter used by `func:` path segments.
pub type KeyPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

static REGISTRY: OnceLock<RwLock<HashMap<String, KeyPredicate>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, KeyPredicate>> {
    REGISTRY.get_or_init(|| RwLock::new(builtins()))
}

/// Registers a custom key predicate for use in query paths.
///
/// The name must match the path segment after `func:`:
///
/// ```
/// use xmlmap::{parse_str, register_query_function};
///
/// register_query_function("startsWithBox", |key| key.starts_with("box"));
/// let tree = parse_str("<items><box1>a</box1><bag>b</bag></items>").unwrap();
/// let found = tree.query_all("items/func:startsWithBox").unwrap();
/// assert_eq!(found.len(), 1);
/// ```
pub fn register_query_function(
    name: impl Into<String>,
    predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
) {
    let mut table = registry().write().unwrap_or_else(|e| e.into_inner());
    table.insert(name.into(), Arc::new(predicate));
}

/// Looks up a predicate by name.
pub(crate) fn lookup(name: &str) -> Option<KeyPredicate> {
    let table = registry().read().unwrap_or_else(|e| e.into_inner());
    table.get(name).cloned()
}

fn is_ascii_lower_digit(key: &str, extra: char) -> bool {
    key.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == extra)
}

#[allow(clippy::too_many_lines)]
fn builtins() -> HashMap<String, KeyPredicate> {
    let mut table: HashMap<String, KeyPredicate> = HashMap::new();
    let mut add = |name: &str, f: KeyPredicate| {
        table.insert(name.to_string(), f);
    };

    // Keys made of digits only.
    add(
        "isNumeric",
        Arc::new(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_digit())),
    );
    // Letters only.
    add(
        "isAlpha",
        Arc::new(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphabetic())),
    );
    add(
        "isAlphanumeric",
        Arc::new(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric())),
    );
    add(
        "isLower",
        Arc::new(|key| !key.is_empty() && key == key.to_lowercase()),
    );
    add(
        "isUpper",
        Arc::new(|key| !key.is_empty() && key == key.to_uppercase()),
    );
    add("hasUnderscore", Arc::new(|key| key.contains('_')));
    add("hasHyphen", Arc::new(|key| key.contains('-')));
    // Structural snake_case: lowercase with underscores, no hyphens.
    // A single lowercase word passes, matching the loose convention.
    add(
        "isSnakeCase",
        Arc::new(|key| {
            !key.is_empty()
                && key == key.to_lowercase()
                && !key.contains('-')
                && is_ascii_lower_digit(key, '_')
        }),
    );
    add(
        "isKebabCase",
        Arc::new(|key| {
            !key.is_empty()
                && key == key.to_lowercase()
                && !key.contains('_')
                && is_ascii_lower_digit(key, '-')
        }),
    );
    add(
        "isCamelCase",
        Arc::new(|key| {
            key.chars().next().is_some_and(|c| c.is_ascii_lowercase())
                && !key.contains('_')
                && !key.contains('-')
        }),
    );
    add(
        "isPascalCase",
        Arc::new(|key| {
            key.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && !key.contains('_')
                && !key.contains('-')
        }),
    );
    add(
        "startsWithUnderscore",
        Arc::new(|key| key.starts_with('_')),
    );
    add("startsWithDot", Arc::new(|key| key.starts_with('.')));
    add(
        "hasDigits",
        Arc::new(|key| key.chars().any(|c| c.is_ascii_digit())),
    );
    // Rough UUID shape: 36 chars with four hyphens.
    add(
        "isUUID",
        Arc::new(|key| key.len() == 36 && key.matches('-').count() == 4),
    );

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, key: &str) -> bool {
        lookup(name).map(|f| f(key)).unwrap_or(false)
    }

    #[test]
    fn test_is_numeric() {
        assert!(check("isNumeric", "12345"));
        assert!(!check("isNumeric", "12a45"));
        assert!(!check("isNumeric", ""));
    }

    #[test]
    fn test_is_alpha_and_alphanumeric() {
        assert!(check("isAlpha", "abcDEF"));
        assert!(!check("isAlpha", "abc1"));
        assert!(check("isAlphanumeric", "abc123"));
        assert!(!check("isAlphanumeric", "abc_123"));
    }

    #[test]
    fn test_case_predicates() {
        assert!(check("isLower", "lower_case"));
        assert!(!check("isLower", "Mixed"));
        assert!(check("isUpper", "UPPER"));
        assert!(check("isSnakeCase", "snake_case_key"));
        assert!(check("isSnakeCase", "word"));
        assert!(!check("isSnakeCase", "kebab-case"));
        assert!(check("isKebabCase", "kebab-case-key"));
        assert!(!check("isKebabCase", "snake_case"));
        assert!(check("isCamelCase", "camelCaseKey"));
        assert!(!check("isCamelCase", "PascalCase"));
        assert!(check("isPascalCase", "PascalCase"));
        assert!(!check("isPascalCase", "camelCase"));
    }

    #[test]
    fn test_content_predicates() {
        assert!(check("hasUnderscore", "a_b"));
        assert!(check("hasHyphen", "a-b"));
        assert!(check("startsWithUnderscore", "_private"));
        assert!(check("startsWithDot", ".hidden"));
        assert!(check("hasDigits", "abc3"));
        assert!(!check("hasDigits", "abc"));
    }

    #[test]
    fn test_is_uuid() {
        assert!(check("isUUID", "550e8400-e29b-41d4-a716-446655440000"));
        assert!(!check("isUUID", "550e8400-e29b-41d4-a716"));
        assert!(!check("isUUID", "not-a-uuid-at-all-just-some-36-chars"));
    }

    #[test]
    fn test_register_and_lookup() {
        register_query_function("endsWithX", |key| key.ends_with('x'));
        assert!(check("endsWithX", "box"));
        assert!(!check("endsWithX", "bag"));
        assert!(lookup("neverRegistered").is_none());
    }
}
