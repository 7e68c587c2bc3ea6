//! # autodeck-process
//!
//! Lifecycle and log multiplexing for external executor processes: one
//! short-lived subprocess per script run, a bounded per-run log channel,
//! and the registry that makes runs addressable and cancellable.

pub mod bus;
pub mod error;
pub mod invoker;
pub mod kill;
pub mod registry;

pub use bus::{LogBus, LogEnvelope, LogKind, LogReceiver};
pub use error::ProcessError;
pub use invoker::{spawn_script_run, ExecutorCommand};
pub use kill::kill_tree;
pub use registry::{RunHandle, RunKind, RunRegistry};
