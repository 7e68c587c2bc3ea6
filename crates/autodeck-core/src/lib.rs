//! # autodeck-core
//!
//! Workflow execution for autodeck: the expression resolver, the node
//! library, the signal-routed flow engine, and the client for the bridge
//! companion process that performs vision/input/code-exec capabilities.

pub mod bridge;
pub mod condition;
pub mod engine;
pub mod error;
pub mod executor;
pub mod expression;
pub mod nodes;

pub use bridge::{BridgeClient, BridgeError, BridgeRequest, BridgeResponse};
pub use engine::{FlowEngine, StepCallback};
pub use error::EngineError;
pub use executor::{map_items_node, route_items_node, Logger, NodeArg, NodeExecutor};
pub use expression::{resolve_config, resolve_template, resolve_value, ResolveScope};
pub use nodes::{tracing_logger, wire_builtin_executors};
