//! Error types for the execution engine.

use autodeck_workflow::WorkflowError;
use thiserror::Error;

/// Errors that can occur while running a workflow.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("no start node found: workflow has no nodes or all nodes have incoming edges")]
    NoStartNode,

    #[error("node '{0}' has no executor")]
    NoExecutor(String),

    #[error("execution was cancelled")]
    Cancelled,
}
