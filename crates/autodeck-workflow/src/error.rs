//! Error types for the workflow data model.

use thiserror::Error;

/// Primary error type for workflow definition operations.
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("no start node found: workflow has no nodes or all nodes have incoming edges")]
    NoStartNode,

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        WorkflowError::Serialization(e.to_string())
    }
}
