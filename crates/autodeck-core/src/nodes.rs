//! Builtin node library.
//!
//! One executor type per node kind, wired over a node's configuration plus
//! the shared bridge client and log sink. "Per item" kinds iterate their
//! input sequence and accumulate per-signal outputs; "once" kinds evaluate
//! against the first input item.

use autodeck_workflow::{
    error_output, is_action_kind, single_output, success_output, ExecutionData, ExecutionItem,
    JsonObject, Node, NodeOutput, Workflow,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::bridge::{BridgeClient, BridgeError};
use crate::condition::{evaluate_operator, legacy_expression_truthy, switch_case_matches};
use crate::executor::{ExecutorMap, Logger, NodeArg, NodeExecutor};
use crate::expression::{resolve_config, ResolveScope};

/// Logger that forwards node lines to tracing.
pub fn tracing_logger() -> Logger {
    Arc::new(|msg: &str| tracing::info!("{msg}"))
}

/// Bind builtin executors for every node that does not have one yet.
///
/// `bridge` may be `None`: action nodes then emit stub output instead of
/// failing the run.
pub fn wire_builtin_executors(
    workflow: &Workflow,
    bridge: Option<BridgeClient>,
    logger: Logger,
    executors: &mut ExecutorMap,
) {
    for node in workflow.nodes.values() {
        if executors.contains_key(&node.id) {
            continue;
        }
        executors.insert(node.id.clone(), builtin_executor(node, bridge.clone(), logger.clone()));
    }
}

/// Construct the builtin executor for one node.
pub fn builtin_executor(
    node: &Node,
    bridge: Option<BridgeClient>,
    logger: Logger,
) -> Arc<dyn NodeExecutor> {
    if is_action_kind(&node.kind) {
        return Arc::new(BridgeActionNode {
            kind: node.kind.clone(),
            config: node.config.clone(),
            bridge,
            logger,
        });
    }

    match node.kind.as_str() {
        "log" => Arc::new(LogNode {
            config: node.config.clone(),
            logger,
        }),
        "sleep" => Arc::new(SleepNode {
            config: node.config.clone(),
            logger,
        }),
        "if_condition" => Arc::new(IfNode {
            config: node.config.clone(),
        }),
        "switch" => Arc::new(SwitchNode {
            config: node.config.clone(),
        }),
        "set_variable" => Arc::new(SetVariableNode {
            config: node.config.clone(),
        }),
        "loop" => Arc::new(LoopNode {
            node_id: node.id.clone(),
            config: node.config.clone(),
            logger,
        }),
        "code" => Arc::new(CodeNode {
            config: node.config.clone(),
            bridge,
            logger,
        }),
        other => Arc::new(PassthroughNode {
            kind: other.to_string(),
        }),
    }
}

// ── Config coercion helpers ──────────────────────────────────────────────

fn config_str(config: &JsonObject, key: &str, default: &str) -> String {
    match config.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => crate::expression::to_plain_string(other),
    }
}

fn config_f64(config: &JsonObject, key: &str) -> Option<f64> {
    match config.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn config_i64(config: &JsonObject, key: &str, default: i64) -> i64 {
    config_f64(config, key).map(|f| f as i64).unwrap_or(default)
}

/// Array value, accepting either a native array or a JSON-string (the UI
/// sometimes embeds JSON inside a string).
fn config_array(config: &JsonObject, key: &str) -> Vec<Value> {
    match config.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn scope_for<'a>(
    run: &'a autodeck_workflow::RunContext,
    item: Option<&'a ExecutionItem>,
) -> ResolveScope<'a> {
    ResolveScope {
        globals: &run.globals,
        item,
        results: &run.results,
        names: &run.names,
    }
}

// ── log ──────────────────────────────────────────────────────────────────

/// Emits one log line per item and passes items through on `success`.
struct LogNode {
    config: JsonObject,
    logger: Logger,
}

#[async_trait]
impl NodeExecutor for LogNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        for item in &arg.input {
            let cfg = resolve_config(&self.config, &scope_for(arg.run, Some(item)));
            let message = config_str(&cfg, "message", "");
            let level = match cfg.get("type") {
                Some(_) => config_str(&cfg, "type", "info"),
                None => config_str(&cfg, "level", "info"),
            };
            (self.logger)(&format!("[workflow][{level}] {message}"));
        }
        success_output(arg.input)
    }
}

// ── sleep ────────────────────────────────────────────────────────────────

/// Waits `seconds` (float) or `duration_ms`, racing against cancellation.
struct SleepNode {
    config: JsonObject,
    logger: Logger,
}

#[async_trait]
impl NodeExecutor for SleepNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        let cfg = resolve_config(&self.config, &scope_for(arg.run, arg.input.first()));
        let duration = match config_f64(&cfg, "seconds") {
            Some(secs) if secs >= 0.0 => std::time::Duration::from_secs_f64(secs),
            _ => std::time::Duration::from_millis(config_i64(&cfg, "duration_ms", 1000).max(0) as u64),
        };

        tokio::select! {
            _ = tokio::time::sleep(duration) => success_output(arg.input),
            _ = arg.cancel.cancelled() => {
                (self.logger)("[workflow] sleep cancelled");
                single_output("cancelled", ExecutionData::new())
            }
        }
    }
}

// ── if_condition ─────────────────────────────────────────────────────────

/// Partitions items onto `true`/`false` by evaluating the configured
/// operator per item.
struct IfNode {
    config: JsonObject,
}

#[async_trait]
impl NodeExecutor for IfNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        let mut output = NodeOutput::new();
        for item in arg.input {
            let cfg = resolve_config(&self.config, &scope_for(arg.run, Some(&item)));
            let verdict = if let Some(op) = cfg.get("operator").and_then(Value::as_str) {
                let value1 = cfg.get("value1").cloned().unwrap_or(Value::Null);
                let value2 = cfg.get("value2").cloned().unwrap_or(Value::Null);
                evaluate_operator(op, &value1, &value2)
            } else {
                legacy_expression_truthy(&config_str(&cfg, "expression", ""))
            };
            let signal = if verdict { "true" } else { "false" };
            output.entry(signal.to_string()).or_default().push(item);
        }
        output
    }
}

// ── switch ───────────────────────────────────────────────────────────────

/// Routes each item to the index of the first matching case, or `default`.
struct SwitchNode {
    config: JsonObject,
}

#[async_trait]
impl NodeExecutor for SwitchNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        let mut output = NodeOutput::new();
        for item in arg.input {
            let cfg = resolve_config(&self.config, &scope_for(arg.run, Some(&item)));
            let value = cfg.get("value").cloned().unwrap_or(Value::Null);
            let mode = config_str(&cfg, "mode", "string");
            let cases = config_array(&cfg, "cases");

            let signal = cases
                .iter()
                .position(|case| switch_case_matches(&mode, &value, case))
                .map(|i| i.to_string())
                .unwrap_or_else(|| "default".to_string());

            output.entry(signal).or_default().push(item);
        }
        output
    }
}

// ── set_variable ─────────────────────────────────────────────────────────

/// Merges `existing JSON ⊕ parsed json_input ⊕ remaining direct keys` per
/// item, later entries winning. Empty input synthesizes one empty item.
struct SetVariableNode {
    config: JsonObject,
}

#[async_trait]
impl NodeExecutor for SetVariableNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        let items = if arg.input.is_empty() {
            vec![ExecutionItem::default()]
        } else {
            arg.input
        };

        let mut out_items = ExecutionData::new();
        for item in items {
            let cfg = resolve_config(&self.config, &scope_for(arg.run, Some(&item)));
            let mut json = item.json.clone();

            let json_input = config_str(&cfg, "json_input", "");
            if !json_input.is_empty() {
                if let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(&json_input) {
                    for (k, v) in parsed {
                        json.insert(k, v);
                    }
                }
            }

            for (key, value) in &cfg {
                if key == "json_input" {
                    continue;
                }
                json.insert(key.clone(), value.clone());
            }

            out_items.push(ExecutionItem {
                json,
                binary: item.binary,
            });
        }
        success_output(out_items)
    }
}

// ── loop ─────────────────────────────────────────────────────────────────

/// Stateful iterator. The counter lives in the run globals under
/// `loop_<node-id>_index` so it is observable in expressions. Each visit
/// emits one `body`; once the counter reaches the end it emits `done` and
/// clears the counter, so re-entry starts fresh.
struct LoopNode {
    node_id: String,
    config: JsonObject,
    logger: Logger,
}

#[async_trait]
impl NodeExecutor for LoopNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        let cfg = resolve_config(&self.config, &scope_for(arg.run, arg.input.first()));
        let counter_key = format!("loop_{}_index", self.node_id);

        let index = arg
            .run
            .globals
            .get(&counter_key)
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let items = config_array(&cfg, "items");
        let total = if items.is_empty() {
            config_i64(&cfg, "count", 1)
        } else {
            items.len() as i64
        };

        if index >= total {
            arg.run.globals.remove(&counter_key);
            (self.logger)(&format!("[workflow] loop finished after {total} iterations"));
            return single_output("done", arg.input);
        }

        arg.run
            .globals
            .insert(counter_key, Value::Number((index + 1).into()));

        let mut json = JsonObject::new();
        if let Some(element) = items.get(index as usize) {
            match element {
                Value::Object(map) => json = map.clone(),
                other => {
                    json.insert("value".into(), other.clone());
                }
            }
        }
        json.insert("index".into(), Value::Number(index.into()));

        single_output("body", vec![ExecutionItem::new(json)])
    }
}

// ── code ─────────────────────────────────────────────────────────────────

/// Hands `{code, input}` to the bridge's `exec_code` action. A list result
/// becomes multiple items, a map becomes one.
struct CodeNode {
    config: JsonObject,
    bridge: Option<BridgeClient>,
    logger: Logger,
}

#[async_trait]
impl NodeExecutor for CodeNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        let first = arg.input.first();
        let cfg = resolve_config(&self.config, &scope_for(arg.run, first));

        let Some(bridge) = &self.bridge else {
            (self.logger)("[workflow] no bridge available, stubbing code node");
            return success_output(vec![ExecutionItem::from_entry("stub", Value::Bool(true))]);
        };

        let mut params = JsonObject::new();
        params.insert(
            "code".into(),
            Value::String(config_str(&cfg, "code", "")),
        );
        let input = match cfg.get("input") {
            Some(v) => v.clone(),
            None => first
                .map(|item| Value::Object(item.json.clone()))
                .unwrap_or(Value::Null),
        };
        params.insert("input".into(), input);

        let resp = match bridge.call("exec_code", params, arg.cancel).await {
            Ok(resp) => resp,
            Err(BridgeError::Cancelled) => {
                return single_output("cancelled", ExecutionData::new());
            }
            Err(e) => return error_output(e.to_string()),
        };

        if resp.is_error() {
            return error_output(resp.error.unwrap_or_default());
        }

        match resp.output {
            Some(Value::Array(list)) => success_output(
                list.into_iter().map(ExecutionItem::from_value).collect(),
            ),
            Some(value) => success_output(vec![ExecutionItem::from_value(value)]),
            None => success_output(vec![ExecutionItem::default()]),
        }
    }
}

// ── bridge action kinds ──────────────────────────────────────────────────

/// Calls the bridge with `action = kind` once per item, merging the
/// response output into the item's JSON. Failures become `error`-signal
/// items, not a fatal run abort.
struct BridgeActionNode {
    kind: String,
    config: JsonObject,
    bridge: Option<BridgeClient>,
    logger: Logger,
}

#[async_trait]
impl NodeExecutor for BridgeActionNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        let mut output = NodeOutput::new();

        for item in arg.input {
            let Some(bridge) = &self.bridge else {
                (self.logger)(&format!("[workflow] no bridge available, stubbing {}", self.kind));
                let mut json = JsonObject::new();
                json.insert("action".into(), Value::String(self.kind.clone()));
                json.insert("stub".into(), Value::Bool(true));
                output
                    .entry("success".to_string())
                    .or_default()
                    .push(ExecutionItem::new(json));
                continue;
            };

            let params = resolve_config(&self.config, &scope_for(arg.run, Some(&item)));
            (self.logger)(&format!("[workflow] bridge call: {}", self.kind));

            match bridge.call(&self.kind, params, arg.cancel).await {
                Ok(resp) if resp.is_error() => {
                    let message = resp.error.unwrap_or_default();
                    (self.logger)(&format!("[workflow] bridge action error: {message}"));
                    output
                        .entry("error".to_string())
                        .or_default()
                        .push(action_error_item(&self.kind, &message));
                }
                Ok(resp) => {
                    let mut json = item.json.clone();
                    if let Some(Value::Object(map)) = resp.output {
                        for (k, v) in map {
                            json.insert(k, v);
                        }
                    }
                    output.entry("success".to_string()).or_default().push(ExecutionItem {
                        json,
                        binary: item.binary,
                    });
                }
                Err(BridgeError::Cancelled) => break,
                Err(e) => {
                    (self.logger)(&format!("[workflow] bridge error: {e}"));
                    output
                        .entry("error".to_string())
                        .or_default()
                        .push(action_error_item(&self.kind, &e.to_string()));
                }
            }
        }

        output
    }
}

fn action_error_item(action: &str, message: &str) -> ExecutionItem {
    let mut json = JsonObject::new();
    json.insert("action".into(), Value::String(action.to_string()));
    json.insert("error".into(), Value::String(message.to_string()));
    ExecutionItem::new(json)
}

// ── unrecognized kinds ───────────────────────────────────────────────────

/// Unknown kinds pass their input through unchanged.
struct PassthroughNode {
    kind: String,
}

#[async_trait]
impl NodeExecutor for PassthroughNode {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        tracing::debug!(kind = %self.kind, "unknown node kind, passing through");
        success_output(arg.input)
    }
}
