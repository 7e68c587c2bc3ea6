//! Registry of in-flight runs.
//!
//! Thread-safe mapping run-id -> handle behind a single reader-writer
//! lock. `cancel` takes the read lock only to obtain the handle and fires
//! the cancellation token without holding it.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bus::LogReceiver;
use crate::error::ProcessError;

/// What a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Script,
    Workflow,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Script => "script",
            RunKind::Workflow => "workflow",
        }
    }
}

/// Handle to one in-flight run.
pub struct RunHandle {
    pub run_id: String,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
    /// OS process id for script runs.
    pub pid: Option<u32>,
    logs: Mutex<Option<LogReceiver>>,
}

impl RunHandle {
    pub fn new(
        run_id: impl Into<String>,
        kind: RunKind,
        cancel: CancellationToken,
        logs: LogReceiver,
        pid: Option<u32>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            kind,
            started_at: Utc::now(),
            cancel,
            pid,
            logs: Mutex::new(Some(logs)),
        }
    }

    /// Take the single consumer end of the run's log channel.
    fn take_logs(&self) -> Option<LogReceiver> {
        self.logs.lock().take()
    }
}

/// Thread-safe run-id -> handle mapping.
#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<String, Arc<RunHandle>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<scope>-<unix-seconds>`; uniqueness across same-second starts is
    /// the caller's responsibility via distinct scopes.
    pub fn make_run_id(scope: &str) -> String {
        format!("{}-{}", scope, Utc::now().timestamp())
    }

    /// Register a run. Same-second collisions on the same scope are
    /// rejected.
    pub fn register(&self, handle: RunHandle) -> Result<Arc<RunHandle>, ProcessError> {
        let mut runs = self.runs.write();
        if runs.contains_key(&handle.run_id) {
            return Err(ProcessError::DuplicateRun(handle.run_id));
        }
        let handle = Arc::new(handle);
        runs.insert(handle.run_id.clone(), handle.clone());
        Ok(handle)
    }

    pub fn lookup(&self, run_id: &str) -> Option<Arc<RunHandle>> {
        self.runs.read().get(run_id).cloned()
    }

    /// Fire the run's cancellation token. Script runs terminate their
    /// process tree; workflow runs observe the token at suspension points.
    pub fn cancel(&self, run_id: &str) -> Result<(), ProcessError> {
        let handle = self
            .lookup(run_id)
            .ok_or_else(|| ProcessError::NotFound(run_id.to_string()))?;
        handle.cancel.cancel();
        Ok(())
    }

    /// Cancel every registered run (shutdown path).
    pub fn cancel_all(&self) {
        let handles: Vec<_> = self.runs.read().values().cloned().collect();
        for handle in handles {
            handle.cancel.cancel();
        }
    }

    /// Take the consumer end of a run's log channel. Each run has exactly
    /// one consumer.
    pub fn log_channel(&self, run_id: &str) -> Result<LogReceiver, ProcessError> {
        let handle = self
            .lookup(run_id)
            .ok_or_else(|| ProcessError::NotFound(run_id.to_string()))?;
        handle
            .take_logs()
            .ok_or_else(|| ProcessError::LogChannelTaken(run_id.to_string()))
    }

    /// Lazy removal once a run is finished with.
    pub fn remove(&self, run_id: &str) {
        self.runs.write().remove(run_id);
    }
}
