//! Workflow definition types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::data::JsonObject;

/// Node kinds that call out to the bridge companion process.
pub const ACTION_KINDS: &[&str] = &[
    "click",
    "swipe",
    "type_text",
    "key_event",
    "screenshot",
    "find_image",
    "click_image",
    "wait_image",
    "wait_click_image",
    "ocr_text",
    "ocr_pattern",
];

/// Whether a node kind requires the bridge companion process.
pub fn is_action_kind(kind: &str) -> bool {
    ACTION_KINDS.contains(&kind)
}

/// A workflow node instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within the workflow.
    pub id: String,
    /// Display name (used by `$node["…"]` expressions).
    pub name: String,
    /// Node kind tag, resolved against the node library at run time.
    pub kind: String,
    /// Configuration mapping; values may contain `{{ … }}` templates.
    #[serde(default)]
    pub config: JsonObject,
    /// Canvas X coordinate (opaque to the engine).
    #[serde(default)]
    pub x: f64,
    /// Canvas Y coordinate; tiebreaker when auto-selecting a start node.
    #[serde(default)]
    pub y: f64,
}

impl Node {
    /// Create a new node with an empty configuration.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            config: JsonObject::new(),
            x: 0.0,
            y: 0.0,
        }
    }

    /// Set a configuration value.
    pub fn set_config(&mut self, key: impl Into<String>, value: Value) {
        self.config.insert(key.into(), value);
    }

    /// Builder-style configuration value.
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set_config(key, value);
        self
    }
}

/// A routing rule from a source node to a target, keyed by signal.
///
/// An empty signal is a wildcard: it matches any signal the source emits.
/// This is intentional and must not be normalised away on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default)]
    pub signal: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_node_id: from.into(),
            to_node_id: to.into(),
            signal: signal.into(),
        }
    }

    /// Whether this edge routes the given signal.
    pub fn matches(&self, from: &str, signal: &str) -> bool {
        self.from_node_id == from && (self.signal == signal || self.signal.is_empty())
    }
}

/// A workflow definition: a directed (possibly cyclic) graph of nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Platform tag: `android`, `desktop`, or empty.
    #[serde(default)]
    pub platform: String,
    /// Nodes keyed by node id.
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
    /// Ordered edge list.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Explicit start node; empty means auto-select.
    #[serde(default)]
    pub start_node_id: String,
}

impl Workflow {
    /// Create a new empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: String::new(),
            name: name.into(),
            description: String::new(),
            platform: String::new(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            start_node_id: String::new(),
        }
    }

    /// Add a node.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Add an edge.
    pub fn connect(&mut self, from: &str, to: &str, signal: &str) {
        self.edges.push(Edge::new(from, to, signal));
    }

    /// Get a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Edges routing `signal` out of `from`, including wildcard edges.
    pub fn edges_from<'a>(
        &'a self,
        from: &'a str,
        signal: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.matches(from, signal))
    }

    /// Select the start node: the explicit id when set, otherwise the node
    /// with no incoming edges and the smallest Y coordinate.
    pub fn start_node(&self) -> Option<&Node> {
        if !self.start_node_id.is_empty() {
            return self.node(&self.start_node_id);
        }

        let has_incoming: std::collections::HashSet<&str> =
            self.edges.iter().map(|e| e.to_node_id.as_str()).collect();

        self.nodes
            .values()
            .filter(|n| !has_incoming.contains(n.id.as_str()))
            .min_by(|a, b| {
                a.y.partial_cmp(&b.y)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Deterministic tiebreak on equal Y.
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    /// Whether any node requires the bridge companion process.
    pub fn needs_bridge(&self) -> bool {
        self.nodes.values().any(|n| is_action_kind(&n.kind))
    }

    /// Node id -> display name lookup, used by the expression resolver.
    pub fn node_names(&self) -> HashMap<String, String> {
        self.nodes
            .values()
            .map(|n| (n.id.clone(), n.name.clone()))
            .collect()
    }

    /// Validate the graph structure: every edge endpoint must exist.
    pub fn validate(&self) -> Result<(), crate::WorkflowError> {
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from_node_id) {
                return Err(crate::WorkflowError::NodeNotFound(edge.from_node_id.clone()));
            }
            if !self.nodes.contains_key(&edge.to_node_id) {
                return Err(crate::WorkflowError::NodeNotFound(edge.to_node_id.clone()));
            }
        }
        if !self.start_node_id.is_empty() && !self.nodes.contains_key(&self.start_node_id) {
            return Err(crate::WorkflowError::NodeNotFound(self.start_node_id.clone()));
        }
        Ok(())
    }
}
