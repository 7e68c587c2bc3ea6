//! # autodeck-workflow
//!
//! Core workflow types and execution data model for autodeck.
//! This crate provides the graph definition (workflows, nodes, edges) and
//! the item/signal data structures that flow between nodes at run time.

pub mod data;
pub mod error;
pub mod step;
pub mod workflow;

pub use data::*;
pub use error::*;
pub use step::*;
pub use workflow::*;
