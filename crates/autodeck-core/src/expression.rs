//! `{{ … }}` template resolution against a three-source context.
//!
//! Recognized expressions:
//! - `$vars.PATH` — the run's globals.
//! - `$json.PATH` — the current item's JSON payload.
//! - `$node["NAME"].json.PATH` / `$node["NAME"].output.PATH` — a prior
//!   node's result, resolved by display name.
//! - bare literals: `true`, `false`, `null`, integers; anything else is
//!   returned as the raw string.
//!
//! When the entire (trimmed) input is a single `{{ … }}` expression the
//! evaluated value keeps its native type; otherwise each expression is
//! stringified in place and the result is a string. Missing keys and type
//! mismatches yield null, never an error.

use autodeck_workflow::{ExecutionItem, JsonObject, NodeOutput};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

fn template_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("template regex"))
}

/// Everything a single resolution can read from.
#[derive(Clone, Copy)]
pub struct ResolveScope<'a> {
    /// Run globals (`$vars`).
    pub globals: &'a JsonObject,
    /// Current item (`$json`); absent for once-per-evaluation nodes.
    pub item: Option<&'a ExecutionItem>,
    /// Prior node results keyed by node id.
    pub results: &'a HashMap<String, NodeOutput>,
    /// Node id -> display name.
    pub names: &'a HashMap<String, String>,
}

/// Resolve every template in a string value.
pub fn resolve_template(input: &str, scope: &ResolveScope) -> Value {
    let trimmed = input.trim();
    if let Some(caps) = template_re().captures(trimmed) {
        let whole = caps.get(0).map(|m| (m.start(), m.end()));
        if whole == Some((0, trimmed.len())) {
            // The whole string is one expression: keep the native type.
            return eval_expr(caps[1].trim(), scope);
        }
    }

    if !input.contains("{{") {
        return Value::String(input.to_string());
    }

    let replaced = template_re().replace_all(input, |caps: &regex::Captures| {
        to_plain_string(&eval_expr(caps[1].trim(), scope))
    });
    Value::String(replaced.into_owned())
}

/// Resolve templates in any JSON value, descending arrays and objects.
pub fn resolve_value(value: &Value, scope: &ResolveScope) -> Value {
    match value {
        Value::String(s) => resolve_template(s, scope),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, scope)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve all values of a node configuration.
pub fn resolve_config(config: &JsonObject, scope: &ResolveScope) -> JsonObject {
    config
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, scope)))
        .collect()
}

/// Stringify a value the way substitution embeds it into surrounding text.
pub fn to_plain_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn eval_expr(expr: &str, scope: &ResolveScope) -> Value {
    if expr == "$vars" {
        return Value::Object(scope.globals.clone());
    }
    if let Some(path) = expr.strip_prefix("$vars.") {
        return walk_path(&Value::Object(scope.globals.clone()), path);
    }

    if expr == "$json" {
        return scope
            .item
            .map(|item| Value::Object(item.json.clone()))
            .unwrap_or(Value::Null);
    }
    if let Some(path) = expr.strip_prefix("$json.") {
        return match scope.item {
            Some(item) => walk_path(&Value::Object(item.json.clone()), path),
            None => Value::Null,
        };
    }

    if let Some(rest) = expr.strip_prefix("$node[") {
        return eval_node_expr(rest, scope);
    }

    parse_literal(expr)
}

/// `$node["NAME"].json.PATH` and `$node["NAME"].output.PATH`.
fn eval_node_expr(rest: &str, scope: &ResolveScope) -> Value {
    let Some(name_part) = rest.strip_prefix('"') else {
        return Value::Null;
    };
    let Some(quote_end) = name_part.find('"') else {
        return Value::Null;
    };
    let name = &name_part[..quote_end];
    let after = name_part[quote_end + 1..].trim_start_matches(']');

    let base = node_result_json(name, scope);

    let path = after
        .strip_prefix(".json")
        .or_else(|| after.strip_prefix(".output"))
        .unwrap_or(after);
    let path = path.strip_prefix('.').unwrap_or(path);

    if path.is_empty() {
        base
    } else {
        walk_path(&base, path)
    }
}

/// Selection rule for a prior node's result: a non-empty `success` output
/// wins, otherwise the first non-empty output in unspecified order.
fn node_result_json(name: &str, scope: &ResolveScope) -> Value {
    let Some(node_id) = scope
        .names
        .iter()
        .find(|(_, n)| n.as_str() == name)
        .map(|(id, _)| id)
    else {
        return Value::Null;
    };
    let Some(output) = scope.results.get(node_id) else {
        return Value::Null;
    };

    let picked = match output.get("success").filter(|d| !d.is_empty()) {
        Some(data) => data.first(),
        None => output.values().find(|d| !d.is_empty()).and_then(|d| d.first()),
    };
    picked
        .map(|item| Value::Object(item.json.clone()))
        .unwrap_or(Value::Null)
}

fn parse_literal(expr: &str) -> Value {
    match expr {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(n) = expr.parse::<i64>() {
                Value::Number(n.into())
            } else {
                Value::String(expr.to_string())
            }
        }
    }
}

/// Descend a dotted path; numeric segments index arrays. Missing keys and
/// type mismatches yield null.
fn walk_path(value: &Value, path: &str) -> Value {
    let mut current = value.clone();
    for segment in path.split('.') {
        current = match &current {
            Value::Object(map) => map.get(segment).cloned().unwrap_or(Value::Null),
            Value::Array(arr) => match segment.parse::<usize>() {
                Ok(idx) => arr.get(idx).cloned().unwrap_or(Value::Null),
                Err(_) => Value::Null,
            },
            _ => Value::Null,
        };
        if current.is_null() {
            return Value::Null;
        }
    }
    current
}
