//! Comparison operators for `if_condition` and case matching for `switch`.

use crate::expression::to_plain_string;
use serde_json::Value;

/// Evaluate a typed operator of the form `type:op` against two values.
///
/// Unknown operators and non-numeric operands of number operators yield
/// `false`; comparisons never error.
pub fn evaluate_operator(operator: &str, value1: &Value, value2: &Value) -> bool {
    let (family, op) = match operator.split_once(':') {
        Some(pair) => pair,
        None => return false,
    };

    match family {
        "string" => {
            let a = to_plain_string(value1);
            let b = to_plain_string(value2);
            match op {
                "equals" => a == b,
                "notEquals" => a != b,
                "contains" => a.contains(&b),
                "notContains" => !a.contains(&b),
                "startsWith" => a.starts_with(&b),
                "endsWith" => a.ends_with(&b),
                "isEmpty" => a.is_empty(),
                "isNotEmpty" => !a.is_empty(),
                _ => false,
            }
        }
        "number" => {
            let (Some(a), Some(b)) = (as_number(value1), as_number(value2)) else {
                return false;
            };
            match op {
                "equals" => a == b,
                "gt" => a > b,
                "gte" => a >= b,
                "lt" => a < b,
                "lte" => a <= b,
                _ => false,
            }
        }
        "boolean" => match op {
            "isTrue" => is_truthy(value1),
            "isFalse" => !is_truthy(value1),
            _ => false,
        },
        "*" => match op {
            "exists" => !value1.is_null() && !to_plain_string(value1).is_empty(),
            _ => false,
        },
        _ => false,
    }
}

/// Legacy fallback when only `expression` is configured: truthy means
/// non-empty, not `"false"`, not `"0"`.
pub fn legacy_expression_truthy(expression: &str) -> bool {
    !expression.is_empty() && expression != "false" && expression != "0"
}

/// Whether a switch case matches under the given mode.
pub fn switch_case_matches(mode: &str, value: &Value, case: &Value) -> bool {
    if mode == "number" {
        match (as_number(value), as_number(case)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    } else {
        to_plain_string(value) == to_plain_string(case)
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}
