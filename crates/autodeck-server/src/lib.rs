//! # autodeck-server
//!
//! The platform's outer surface: HTTP/WebSocket routes, the script and
//! asset store, ZIP import/export, the workflow CRUD store, and the
//! orchestrator that binds definitions to runs.

pub mod archive;
pub mod config;
pub mod devices;
pub mod error;
pub mod orchestrator;
pub mod routes;
pub mod scripts;
pub mod store;

pub use config::ServerConfig;
pub use error::ApiError;
pub use orchestrator::Orchestrator;
pub use routes::{router, AppState};
