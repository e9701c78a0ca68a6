//! Rule-based validation over query paths.
//!
//! A lightweight constraint engine for dynamic trees: each [`Rule`] names
//! a path and the checks to apply there. Violations come back as
//! human-readable strings rather than errors, so callers can collect and
//! report all of them at once.

use crate::map::Value;
use crate::query::query;

/// A validation constraint applied at a query path.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    /// Path to the element to validate (e.g. `server/port`).
    pub path: String,
    /// The path must resolve to something.
    pub required: bool,
    /// Expected shape: `int`, `float`, `string`, `bool`, or `array`.
    /// Empty means no type check.
    pub kind: String,
    /// Minimum numeric value (checked when non-zero).
    pub min: f64,
    /// Maximum numeric value (checked when non-zero).
    pub max: f64,
    /// The value must equal one of these strings.
    pub allowed: Vec<String>,
}

/// Evaluates the rules against the tree, returning one message per
/// violation. An empty result means the tree passed.
///
/// ```
/// use xmlmap::{parse_str, validate, Rule, Value};
///
/// let tree = parse_str("<server><port>99999</port></server>").unwrap();
/// let rules = vec![Rule {
///     path: "server/port".to_string(),
///     required: true,
///     kind: "int".to_string(),
///     min: 1.0,
///     max: 65535.0,
///     ..Rule::default()
/// }];
/// let errors = validate(&Value::Map(tree), &rules);
/// assert_eq!(errors.len(), 1);
/// ```
#[must_use]
pub fn validate(data: &Value, rules: &[Rule]) -> Vec<String> {
    let mut errors = Vec::new();

    for rule in rules {
        let value = match query(data, &rule.path) {
            Ok(v) => v,
            Err(_) => {
                if rule.required {
                    errors.push(format!("missing required path: {}", rule.path));
                }
                continue;
            }
        };

        let mut numeric: Option<f64> = None;
        let mut text: Option<String> = None;

        match rule.kind.as_str() {
            "array" => {
                if !matches!(value, Value::List(_)) {
                    errors.push(format!("{} must be an array", rule.path));
                }
            }
            "int" | "float" => match as_number(&value) {
                Some(n) => numeric = Some(n),
                None => errors.push(format!("{} must be numeric", rule.path)),
            },
            "bool" => {
                let s = value.to_string().to_ascii_lowercase();
                if !matches!(s.as_str(), "true" | "false" | "0" | "1") {
                    errors.push(format!("{} must be a boolean", rule.path));
                }
            }
            "string" | "" => text = Some(value.to_string()),
            other => errors.push(format!("{}: unknown type constraint {other}", rule.path)),
        }

        if let Some(n) = numeric {
            if rule.min != 0.0 && n < rule.min {
                errors.push(format!(
                    "{} value {n} below minimum {}",
                    rule.path, rule.min
                ));
            }
            if rule.max != 0.0 && n > rule.max {
                errors.push(format!(
                    "{} value {n} above maximum {}",
                    rule.path, rule.max
                ));
            }
        }

        if let Some(s) = text {
            if !rule.allowed.is_empty() && !rule.allowed.iter().any(|a| a == &s) {
                errors.push(format!(
                    "{} value {s:?} not allowed; expected one of {:?}",
                    rule.path, rule.allowed
                ));
            }
        }
    }

    errors
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
