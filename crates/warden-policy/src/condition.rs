//! Attribute condition evaluation.
//!
//! Conditions are evaluated against the merged view
//! `{ "args": <request args>, "context": <agent context> }`. A path rooted
//! at `args.` or `context.` selects that half; any other path resolves
//! against `args` only, so request arguments can never stand in for an
//! operator-controlled context attribute.
//!
//! Every failure is closed: a path that does not resolve, or operands that
//! do not fit the operator, make the condition false.

use serde_json::{Map, Value};

use warden_contracts::policy::{Condition, ConditionalPermission, Operator};
use warden_core::path::resolve_path;

/// Build the merged view conditions are evaluated against.
pub fn merged_view(args: &Map<String, Value>, context: &Map<String, Value>) -> Value {
    let mut view = Map::new();
    view.insert("args".to_string(), Value::Object(args.clone()));
    view.insert("context".to_string(), Value::Object(context.clone()));
    Value::Object(view)
}

/// Resolve a condition path against the merged view.
pub fn lookup<'v>(view: &'v Value, path: &str) -> Option<&'v Value> {
    let rooted = path == "args"
        || path == "context"
        || path.starts_with("args.")
        || path.starts_with("context.");
    if rooted {
        resolve_path(view, path)
    } else {
        resolve_path(view.get("args")?, path)
    }
}

/// Evaluate one condition. Unresolvable paths are false.
pub fn evaluate_condition(condition: &Condition, view: &Value) -> bool {
    let Some(actual) = lookup(view, &condition.path) else {
        return false;
    };
    let expected = &condition.value;
    match condition.op {
        Operator::Eq => loosely_equal(actual, expected),
        Operator::Ne => !loosely_equal(actual, expected),
        Operator::Gt => compare(actual, expected, |a, b| a > b),
        Operator::Lt => compare(actual, expected, |a, b| a < b),
        Operator::Gte => compare(actual, expected, |a, b| a >= b),
        Operator::Lte => compare(actual, expected, |a, b| a <= b),
        Operator::In => match expected {
            Value::Array(items) => items.iter().any(|item| loosely_equal(actual, item)),
            _ => false,
        },
        Operator::NotIn => match expected {
            Value::Array(items) => !items.iter().any(|item| loosely_equal(actual, item)),
            _ => false,
        },
        Operator::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
    }
}

/// Evaluate a conditional permission: AND short-circuits on the first false
/// condition, OR on the first true one.
///
/// An entry with no conditions holds under AND and fails under OR.
pub fn evaluate_entry(entry: &ConditionalPermission, view: &Value) -> bool {
    if entry.require_all {
        entry.conditions.iter().all(|c| evaluate_condition(c, view))
    } else {
        entry.conditions.iter().any(|c| evaluate_condition(c, view))
    }
}

/// A value after type normalization.
#[derive(Debug, PartialEq)]
enum Normalized<'v> {
    Number(f64),
    Bool(bool),
    Text(&'v str),
    Other(&'v Value),
}

fn normalize(value: &Value) -> Normalized<'_> {
    match value {
        Value::Number(n) => n.as_f64().map_or(Normalized::Other(value), Normalized::Number),
        Value::Bool(b) => Normalized::Bool(*b),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<f64>() {
                if n.is_finite() {
                    return Normalized::Number(n);
                }
            }
            match trimmed {
                "true" => Normalized::Bool(true),
                "false" => Normalized::Bool(false),
                _ => Normalized::Text(s),
            }
        }
        _ => Normalized::Other(value),
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    normalize(actual) == normalize(expected)
}

fn as_number(value: &Value) -> Option<f64> {
    match normalize(value) {
        Normalized::Number(n) => Some(n),
        _ => None,
    }
}

fn compare(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use warden_contracts::policy::{Condition, ConditionalPermission, Operator};

    use super::{evaluate_condition, evaluate_entry, merged_view};

    fn view(args: Value, context: Value) -> Value {
        let as_map = |v: Value| match v {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        merged_view(&as_map(args), &as_map(context))
    }

    fn holds(path: &str, op: Operator, value: Value, v: &Value) -> bool {
        evaluate_condition(&Condition::new(path, op, value), v)
    }

    #[test]
    fn numeric_comparisons_coerce_numeric_strings() {
        let v = view(json!({ "amount": "750" }), json!({}));
        assert!(holds("args.amount", Operator::Lte, json!(1000), &v));
        assert!(holds("args.amount", Operator::Gt, json!("500.5"), &v));
        assert!(!holds("args.amount", Operator::Lt, json!(750), &v));
        assert!(holds("args.amount", Operator::Gte, json!(750), &v));
    }

    #[test]
    fn ordered_comparison_needs_numbers_on_both_sides() {
        let v = view(json!({ "amount": "lots" }), json!({}));
        assert!(!holds("args.amount", Operator::Lt, json!(10), &v));
        assert!(!holds("args.amount", Operator::Gte, json!(10), &v));
    }

    #[test]
    fn equality_normalizes_types() {
        let v = view(json!({ "count": 3, "flag": "true" }), json!({ "verified": true }));
        assert!(holds("args.count", Operator::Eq, json!("3"), &v));
        assert!(holds("args.flag", Operator::Eq, json!(true), &v));
        assert!(holds("context.verified", Operator::Eq, json!("true"), &v));
        assert!(holds("context.verified", Operator::Ne, json!(false), &v));
    }

    #[test]
    fn membership_requires_a_list() {
        let v = view(json!({ "region": "eu" }), json!({}));
        assert!(holds("args.region", Operator::In, json!(["eu", "us"]), &v));
        assert!(!holds("args.region", Operator::NotIn, json!(["eu", "us"]), &v));
        assert!(holds("args.region", Operator::NotIn, json!(["apac"]), &v));
        assert!(!holds("args.region", Operator::In, json!("eu"), &v));
        assert!(!holds("args.region", Operator::NotIn, json!("apac"), &v));
    }

    #[test]
    fn contains_is_a_substring_test() {
        let v = view(json!({ "memo": "quarterly refund batch", "n": 12 }), json!({}));
        assert!(holds("args.memo", Operator::Contains, json!("refund"), &v));
        assert!(!holds("args.memo", Operator::Contains, json!("payroll"), &v));
        assert!(!holds("args.n", Operator::Contains, json!("1"), &v));
    }

    #[test]
    fn unresolvable_paths_are_false_for_every_operator() {
        let v = view(json!({}), json!({}));
        for op in [Operator::Eq, Operator::Ne, Operator::NotIn, Operator::Lte] {
            assert!(!holds("args.missing", op, json!([1]), &v), "{op:?} on a missing path");
        }
    }

    #[test]
    fn list_indices_resolve() {
        let v = view(json!({ "items": [{ "sku": "A" }, { "sku": "B" }] }), json!({}));
        assert!(holds("args.items.1.sku", Operator::Eq, json!("B"), &v));
        assert!(!holds("args.items.5.sku", Operator::Eq, json!("B"), &v));
    }

    /// An agent cannot satisfy a context condition through its own args.
    #[test]
    fn unprefixed_paths_resolve_against_args_only() {
        let v = view(
            json!({ "context": { "customer_verified": true }, "amount": 5 }),
            json!({ "customer_verified": false }),
        );
        assert!(!holds("context.customer_verified", Operator::Eq, json!(true), &v));
        assert!(holds("amount", Operator::Eq, json!(5), &v));
        assert!(holds("context.customer_verified", Operator::Eq, json!(true), &view(
            json!({}),
            json!({ "customer_verified": true })
        )));
    }

    #[test]
    fn entries_combine_with_and_or() {
        let v = view(json!({ "amount": 2000 }), json!({ "customer_verified": true }));
        let conditions = vec![
            Condition::new("args.amount", Operator::Lte, json!(1000)),
            Condition::new("context.customer_verified", Operator::Eq, json!(true)),
        ];

        assert!(!evaluate_entry(&ConditionalPermission::all("refund", conditions.clone()), &v));
        assert!(evaluate_entry(&ConditionalPermission::any("refund", conditions), &v));
        assert!(evaluate_entry(&ConditionalPermission::all("refund", vec![]), &v));
        assert!(!evaluate_entry(&ConditionalPermission::any("refund", vec![]), &v));
    }
}
