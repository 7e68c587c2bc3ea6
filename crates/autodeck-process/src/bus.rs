//! Per-run bounded log channel.
//!
//! Producers are the executor's pipe readers (script runs) or the flow
//! engine and node loggers (workflow runs). Writers never block: on a full
//! buffer the message is dropped and counted locally. The channel closes
//! exactly once, when every sender clone has been dropped; consumers
//! observe EOF as channel closure.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Bounded capacity of one run's log channel.
pub const LOG_BUS_CAPACITY: usize = 100;

/// Message kinds carried in JSON envelopes (§ log envelope format).
/// Plain executor stdout lines travel on the bus verbatim, without an
/// envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Stderr,
    Status,
    Error,
    ExecutionStep,
}

/// JSON envelope published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEnvelope {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl LogEnvelope {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Consumer end of a run's log channel.
pub type LogReceiver = mpsc::Receiver<String>;

/// Cloneable producer handle for one run's log channel.
#[derive(Clone)]
pub struct LogBus {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
}

impl LogBus {
    /// Create a bus with the default capacity.
    pub fn new() -> (Self, LogReceiver) {
        Self::with_capacity(LOG_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, LogReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Publish one line. Never blocks; drops and counts when full or when
    /// the consumer is gone.
    pub fn publish(&self, line: impl Into<String>) {
        if self.tx.try_send(line.into()).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(dropped, "log bus full, dropping message");
        }
    }

    /// Publish a JSON envelope.
    pub fn publish_envelope(&self, kind: LogKind, message: impl Into<String>) {
        self.publish(LogEnvelope::new(kind, message).to_line());
    }

    /// Messages dropped so far because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
