//! JSON tree comparison and JSONPath selection.

use serde_json::Value;
use serde_json_path::JsonPath;

/// Full structural equality. Objects must have the same key set.
pub fn json_equals(actual: &Value, expected: &Value, ignore_case: bool) -> bool {
    match (actual, expected) {
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && b.iter().all(|(key, expected_val)| {
                    a.get(key)
                        .is_some_and(|actual_val| json_equals(actual_val, expected_val, ignore_case))
                })
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| json_equals(x, y, ignore_case))
        }
        _ => scalar_equals(actual, expected, ignore_case),
    }
}

/// Subset equality: every key of `expected` must be present in `actual`
/// and match recursively. Extra keys in `actual` are allowed.
pub fn json_partial_equals(actual: &Value, expected: &Value, ignore_case: bool) -> bool {
    match (actual, expected) {
        (Value::Object(a), Value::Object(b)) => b.iter().all(|(key, expected_val)| {
            a.get(key).is_some_and(|actual_val| {
                json_partial_equals(actual_val, expected_val, ignore_case)
            })
        }),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| json_partial_equals(x, y, ignore_case))
        }
        _ => scalar_equals(actual, expected, ignore_case),
    }
}

fn scalar_equals(actual: &Value, expected: &Value, ignore_case: bool) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        // 1 and 1.0 are the same number in a JSON document
        (Value::Number(a), Value::Number(b)) => a == b || a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => {
            if ignore_case {
                a.to_lowercase() == b.to_lowercase()
            } else {
                a == b
            }
        }
        _ => false,
    }
}

/// Whether the query selects at least one node.
pub fn json_path_selects(path: &JsonPath, value: &Value) -> bool {
    !path.query(value).is_empty()
}
