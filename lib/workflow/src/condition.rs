//! Condition evaluation for routing nodes.
//!
//! A condition is a single `{field, operator, value}` predicate evaluated
//! against the instance data bag. Evaluation is a pure function of the
//! condition and the data: malformed field paths, type mismatches, and
//! missing values all evaluate to `false`, never to an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// The routing label a condition produces when it holds.
pub const LABEL_TRUE: &str = "true";
/// The routing label a condition produces when it does not hold.
pub const LABEL_FALSE: &str = "false";
/// The fallback routing label when neither result label matches an edge.
pub const LABEL_DEFAULT: &str = "default";

/// Comparison operators available to condition nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
}

/// A single predicate over the instance data bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the data bag, e.g. `request.amount`.
    pub field: String,
    /// The comparison to apply.
    pub operator: ConditionOperator,
    /// The right-hand side of the comparison.
    pub value: JsonValue,
}

impl Condition {
    /// Creates a condition.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: JsonValue,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluates the condition against the data bag.
    #[must_use]
    pub fn evaluate(&self, data: &Map<String, JsonValue>) -> bool {
        let Some(actual) = lookup_path(data, &self.field) else {
            return false;
        };

        match self.operator {
            ConditionOperator::Equals => values_equal(actual, &self.value),
            ConditionOperator::NotEquals => !values_equal(actual, &self.value),
            ConditionOperator::GreaterThan => compare(actual, &self.value) == Some(std::cmp::Ordering::Greater),
            ConditionOperator::LessThan => compare(actual, &self.value) == Some(std::cmp::Ordering::Less),
            ConditionOperator::Contains => contains(actual, &self.value),
        }
    }

    /// Evaluates to the routing label: `"true"` or `"false"`.
    #[must_use]
    pub fn evaluate_label(&self, data: &Map<String, JsonValue>) -> &'static str {
        if self.evaluate(data) {
            LABEL_TRUE
        } else {
            LABEL_FALSE
        }
    }
}

/// Walks a dotted path through nested objects.
fn lookup_path<'a>(data: &'a Map<String, JsonValue>, path: &str) -> Option<&'a JsonValue> {
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Equality with numeric coercion: `1` equals `1.0`.
fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering over numbers, or lexicographic over strings.
fn compare(a: &JsonValue, b: &JsonValue) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

/// Substring match on strings, membership on arrays.
fn contains(haystack: &JsonValue, needle: &JsonValue) -> bool {
    match haystack {
        JsonValue::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        JsonValue::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn equals_with_numeric_coercion() {
        let bag = data(json!({"amount": 100}));
        let condition = Condition::new("amount", ConditionOperator::Equals, json!(100.0));
        assert!(condition.evaluate(&bag));
    }

    #[test]
    fn not_equals() {
        let bag = data(json!({"status": "open"}));
        let condition = Condition::new("status", ConditionOperator::NotEquals, json!("closed"));
        assert!(condition.evaluate(&bag));
    }

    #[test]
    fn greater_and_less_than_on_numbers() {
        let bag = data(json!({"amount": 500}));
        assert!(Condition::new("amount", ConditionOperator::GreaterThan, json!(100)).evaluate(&bag));
        assert!(!Condition::new("amount", ConditionOperator::LessThan, json!(100)).evaluate(&bag));
    }

    #[test]
    fn ordering_on_strings_is_lexicographic() {
        let bag = data(json!({"name": "beta"}));
        assert!(Condition::new("name", ConditionOperator::GreaterThan, json!("alpha")).evaluate(&bag));
    }

    #[test]
    fn contains_on_strings_and_arrays() {
        let bag = data(json!({"title": "urgent request", "tags": ["finance", "travel"]}));
        assert!(Condition::new("title", ConditionOperator::Contains, json!("urgent")).evaluate(&bag));
        assert!(Condition::new("tags", ConditionOperator::Contains, json!("travel")).evaluate(&bag));
        assert!(!Condition::new("tags", ConditionOperator::Contains, json!("legal")).evaluate(&bag));
    }

    #[test]
    fn dotted_path_lookup() {
        let bag = data(json!({"request": {"amount": 42}}));
        let condition = Condition::new("request.amount", ConditionOperator::Equals, json!(42));
        assert!(condition.evaluate(&bag));
    }

    #[test]
    fn malformed_paths_evaluate_to_false() {
        let bag = data(json!({"request": {"amount": 42}}));
        for field in ["", "missing", "request.missing", "request.amount.deeper"] {
            let condition = Condition::new(field, ConditionOperator::Equals, json!(42));
            assert!(!condition.evaluate(&bag), "path '{field}' should be false");
        }
    }

    #[test]
    fn type_mismatch_ordering_is_false() {
        let bag = data(json!({"amount": "lots"}));
        assert!(!Condition::new("amount", ConditionOperator::GreaterThan, json!(10)).evaluate(&bag));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let bag = data(json!({"amount": 7}));
        let condition = Condition::new("amount", ConditionOperator::LessThan, json!(10));
        assert_eq!(condition.evaluate_label(&bag), condition.evaluate_label(&bag));
        assert_eq!(condition.evaluate_label(&bag), LABEL_TRUE);
    }

    #[test]
    fn operator_wire_names_are_camel_case() {
        let json = serde_json::to_value(ConditionOperator::NotEquals).expect("serialize");
        assert_eq!(json, "notEquals");
        let parsed: ConditionOperator =
            serde_json::from_value(serde_json::json!("greaterThan")).expect("deserialize");
        assert_eq!(parsed, ConditionOperator::GreaterThan);
    }
}
