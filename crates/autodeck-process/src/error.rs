//! Error types for process supervision.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("process not found: {0}")]
    NotFound(String),

    #[error("run id already registered: {0}")]
    DuplicateRun(String),

    #[error("log channel for run {0} already taken")]
    LogChannelTaken(String),

    #[error("failed to spawn executor: {0}")]
    Spawn(#[from] std::io::Error),
}
