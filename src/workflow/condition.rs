//! Field comparisons shared by condition and filter nodes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::template::{self, Scope};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "eq")]
    Equals,
    #[serde(alias = "ne")]
    NotEquals,
    #[serde(alias = "gt")]
    GreaterThan,
    #[serde(alias = "lt")]
    LessThan,
    #[serde(alias = "gte")]
    GreaterOrEqual,
    #[serde(alias = "lte")]
    LessOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    In,
    NotIn,
    /// Anything unrecognized; always evaluates to false.
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    /// path or template of the value under test
    pub field: String,
    pub operator: Operator,
    /// right-hand side; templates are rendered first
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    /// Evaluates this condition against `scope`. Pure: no side effects.
    pub fn evaluate(
        &self,
        scope: &dyn Scope,
    ) -> bool {
        let left = if self.field.contains("{{") {
            Some(template::render(&Value::String(self.field.clone()), scope))
        } else {
            template::evaluate(&self.field, scope)
        };
        let right = template::render(&self.value, scope);
        compare(self.operator, left.as_ref(), &right)
    }
}

/// Combines per-condition results. An empty list is vacuously true for AND, false for OR.
pub fn combine(
    combinator: Combinator,
    results: &[bool],
) -> bool {
    match combinator {
        Combinator::And => results.iter().all(|r| *r),
        Combinator::Or => results.iter().any(|r| *r),
    }
}

/// Applies `op`; `left` is `None` when the field is undefined.
pub fn compare(
    op: Operator,
    left: Option<&Value>,
    right: &Value,
) -> bool {
    let null = Value::Null;
    let l = left.unwrap_or(&null);
    match op {
        Operator::Equals => loose_eq(l, right),
        Operator::NotEquals => !loose_eq(l, right),
        Operator::GreaterThan => order(l, right) == Some(Ordering::Greater),
        Operator::LessThan => order(l, right) == Some(Ordering::Less),
        Operator::GreaterOrEqual => matches!(order(l, right), Some(Ordering::Greater | Ordering::Equal)),
        Operator::LessOrEqual => matches!(order(l, right), Some(Ordering::Less | Ordering::Equal)),
        Operator::Contains => left.is_some() && js_string(l).contains(&js_string(right)),
        Operator::NotContains => left.is_none() || !js_string(l).contains(&js_string(right)),
        Operator::StartsWith => left.is_some() && js_string(l).starts_with(&js_string(right)),
        Operator::EndsWith => left.is_some() && js_string(l).ends_with(&js_string(right)),
        Operator::IsEmpty => is_empty(l),
        Operator::IsNotEmpty => !is_empty(l),
        Operator::In => right.as_array().map(|items| items.iter().any(|v| loose_eq(l, v))).unwrap_or(false),
        Operator::NotIn => !right.as_array().map(|items| items.iter().any(|v| loose_eq(l, v))).unwrap_or(false),
        Operator::Unknown => false,
    }
}

/// JavaScript `String(value)`.
pub fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                v => js_string(v),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

/// JavaScript `Number(value)`; `None` stands for NaN.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// JavaScript `==` over JSON values; composites compare structurally.
pub fn loose_eq(
    a: &Value,
    b: &Value,
) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(_), Value::Number(_))
        | (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => match (to_number(a), to_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Array(_), Value::String(_)) | (Value::Object(_), Value::String(_)) => js_string(a) == js_string(b),
        (Value::String(_), Value::Array(_)) | (Value::String(_), Value::Object(_)) => js_string(a) == js_string(b),
        _ => a == b,
    }
}

/// Relational ordering: two strings compare lexically, everything else numerically.
fn order(
    a: &Value,
    b: &Value,
) -> Option<Ordering> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return match (x.trim().parse::<f64>(), y.trim().parse::<f64>()) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y),
            _ => Some(x.cmp(y)),
        };
    }
    to_number(a)?.partial_cmp(&to_number(b)?)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        other => !template::truthy(other),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn cond(
        field: &str,
        operator: &str,
        value: Value,
    ) -> Condition {
        serde_json::from_value(json!({"field": field, "operator": operator, "value": value})).unwrap()
    }

    #[test]
    fn test_operator_aliases() {
        let scope = json!({"trigger": {"age": 20, "name": "ada", "tags": ["x", "y"], "blank": ""}});
        assert!(cond("trigger.age", "gte", json!(18)).evaluate(&scope));
        assert!(cond("trigger.age", "greater_or_equal", json!("18")).evaluate(&scope));
        assert!(cond("trigger.age", "eq", json!("20")).evaluate(&scope));
        assert!(cond("trigger.age", "ne", json!(21)).evaluate(&scope));
        assert!(cond("trigger.age", "lt", json!(100)).evaluate(&scope));
        assert!(!cond("trigger.age", "less_or_equal", json!(19)).evaluate(&scope));
        assert!(cond("trigger.name", "contains", json!("d")).evaluate(&scope));
        assert!(cond("trigger.name", "not_contains", json!("z")).evaluate(&scope));
        assert!(cond("trigger.name", "starts_with", json!("ad")).evaluate(&scope));
        assert!(cond("trigger.name", "ends_with", json!("da")).evaluate(&scope));
        assert!(cond("trigger.blank", "is_empty", Value::Null).evaluate(&scope));
        assert!(cond("trigger.missing", "is_empty", Value::Null).evaluate(&scope));
        assert!(cond("trigger.tags", "is_not_empty", Value::Null).evaluate(&scope));
        assert!(cond("trigger.name", "in", json!(["bob", "ada"])).evaluate(&scope));
        assert!(cond("trigger.name", "not_in", json!(["bob"])).evaluate(&scope));
    }

    #[test]
    fn test_unknown_operator_is_false() {
        let scope = json!({"trigger": {"age": 20}});
        let c = cond("trigger.age", "roughly", json!(20));
        assert_eq!(c.operator, Operator::Unknown);
        assert!(!c.evaluate(&scope));
    }

    #[test]
    fn test_value_is_rendered() {
        let scope = json!({"trigger": {"age": 20}, "variables": {"min": 18}});
        assert!(cond("trigger.age", "gt", json!("{{variables.min}}")).evaluate(&scope));
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_eq(&json!(1), &json!("1")));
        assert!(loose_eq(&json!(true), &json!(1)));
        assert!(loose_eq(&json!("1,2"), &json!([1, 2])));
        assert!(!loose_eq(&Value::Null, &json!(0)));
        assert!(!loose_eq(&json!("a"), &json!(0)));
    }

    #[test]
    fn test_combine() {
        assert!(combine(Combinator::And, &[true, true]));
        assert!(!combine(Combinator::And, &[true, false]));
        assert!(combine(Combinator::Or, &[false, true]));
        assert!(!combine(Combinator::Or, &[]));
    }
}
