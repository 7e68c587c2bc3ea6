//! Data types for workflow execution data.
//!
//! Items are the unit of data transported along edges. Each node evaluation
//! consumes one [`ExecutionData`] sequence and emits a [`NodeOutput`]: a map
//! from signal label to the sequence routed on that signal.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// JSON payload of an item (string-keyed, arbitrary values).
pub type JsonObject = serde_json::Map<String, Value>;

/// Individual execution data item flowing through nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionItem {
    /// Primary JSON data payload.
    pub json: JsonObject,
    /// Binary payloads keyed by name (opaque to the engine).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<HashMap<String, Vec<u8>>>,
}

impl ExecutionItem {
    /// Create a new item with just a JSON payload.
    pub fn new(json: JsonObject) -> Self {
        Self { json, binary: None }
    }

    /// Create an item from a single key/value pair.
    pub fn from_entry(key: impl Into<String>, value: Value) -> Self {
        let mut json = JsonObject::new();
        json.insert(key.into(), value);
        Self::new(json)
    }

    /// Create an item from any JSON value. Objects become the payload
    /// directly; anything else is wrapped under `value`; null is empty.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            Value::Null => Self::default(),
            other => Self::from_entry("value", other),
        }
    }

    /// Attach a named binary payload.
    pub fn with_binary(mut self, key: impl Into<String>, data: Vec<u8>) -> Self {
        self.binary
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), data);
        self
    }
}

/// Ordered sequence of items carried along one edge.
pub type ExecutionData = Vec<ExecutionItem>;

/// Result of one node evaluation: signal label -> items emitted on it.
///
/// An output is "empty" when its data sequence is empty; empty outputs are
/// never routed.
pub type NodeOutput = HashMap<String, ExecutionData>;

/// Wrap an arbitrary input value into execution data for seeding a run.
///
/// A map becomes a single item; null becomes a single item with empty JSON;
/// any other value becomes a single item wrapping it. Callers must not
/// depend on the wrapping key for primitive inputs.
pub fn seed_data(input: Value) -> ExecutionData {
    vec![ExecutionItem::from_value(input)]
}

/// Build a single-signal output.
pub fn single_output(signal: impl Into<String>, data: ExecutionData) -> NodeOutput {
    let mut out = NodeOutput::new();
    out.insert(signal.into(), data);
    out
}

/// Build a `success` output carrying the given items.
pub fn success_output(data: ExecutionData) -> NodeOutput {
    single_output("success", data)
}

/// Build an `error` output with a single `{error: message}` item.
pub fn error_output(message: impl Into<String>) -> NodeOutput {
    single_output(
        "error",
        vec![ExecutionItem::from_entry("error", Value::String(message.into()))],
    )
}
