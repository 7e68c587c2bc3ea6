//! Per-node execution records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::{ExecutionData, NodeOutput};

/// Outcome of one node evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Success,
    Error,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Error => "error",
            StepStatus::Cancelled => "cancelled",
        }
    }
}

/// Record of a single node evaluation within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub node_id: String,
    pub node_name: String,
    pub node_kind: String,
    /// Primary signal chosen for display; callers must not rely on which
    /// key is chosen when a node emits several.
    pub signal: String,
    pub status: StepStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: i64,
    /// Emitted outputs; keys are exactly the signals the node returned.
    pub output: NodeOutput,
}

impl ExecutionStep {
    /// Synthesize a step from a node evaluation. The status is `error` when
    /// the output carries an `error` signal, `success` otherwise.
    pub fn from_output(
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        node_kind: impl Into<String>,
        output: NodeOutput,
        started_at: chrono::DateTime<chrono::Utc>,
        finished_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let signal = output.keys().next().cloned().unwrap_or_default();
        let status = if output.contains_key("error") {
            StepStatus::Error
        } else {
            StepStatus::Success
        };
        Self {
            node_id: node_id.into(),
            node_name: node_name.into(),
            node_kind: node_kind.into(),
            signal,
            status,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            output,
        }
    }
}

/// Final result of a flow engine run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// The last executed node's output.
    pub output: NodeOutput,
    /// Steps in execution order.
    pub execution_path: Vec<ExecutionStep>,
}

impl ExecutionResult {
    /// First item of the first non-empty output, preferring `success`.
    /// Convenience accessor for tests and callers inspecting results.
    pub fn primary_items(&self) -> Option<&ExecutionData> {
        if let Some(data) = self.output.get("success") {
            if !data.is_empty() {
                return Some(data);
            }
        }
        self.output.values().find(|d| !d.is_empty())
    }
}

/// Per-run context shared across all nodes of one engine execution.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Mutable globals, shared across nodes (`$vars`, loop counters).
    pub globals: crate::data::JsonObject,
    /// Latest output of each node, keyed by node id.
    pub results: HashMap<String, NodeOutput>,
    /// Node id -> display name, for `$node["…"]` expressions.
    pub names: HashMap<String, String>,
}

impl RunContext {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self {
            globals: crate::data::JsonObject::new(),
            results: HashMap::new(),
            names,
        }
    }
}
