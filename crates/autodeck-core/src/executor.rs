//! Node executor trait and helpers.

use async_trait::async_trait;
use autodeck_workflow::{success_output, ExecutionData, ExecutionItem, NodeOutput, RunContext};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sink for per-node log lines (routed into the run's log bus).
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// Input to one node evaluation.
pub struct NodeArg<'a> {
    /// Items arriving on the triggering edge.
    pub input: ExecutionData,
    /// Mutable run state: globals, prior results, name lookup.
    pub run: &'a mut RunContext,
    /// Cancellation of the whole run; observed at suspension points.
    pub cancel: &'a CancellationToken,
}

/// Trait implemented by every node kind.
///
/// Executors never fail the run: internal errors are converted into an
/// `error`-signal output so data flow can still route them to a handler.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput;
}

/// Per-node executor table keyed by node id.
pub type ExecutorMap = HashMap<String, Arc<dyn NodeExecutor>>;

/// Executor wrapping a synchronous closure. Useful for custom nodes.
pub struct FnExecutor<F>(pub F);

#[async_trait]
impl<F> NodeExecutor for FnExecutor<F>
where
    F: Fn(NodeArg<'_>) -> NodeOutput + Send + Sync,
{
    async fn execute(&self, arg: NodeArg<'_>) -> NodeOutput {
        (self.0)(arg)
    }
}

/// Custom node that transforms each item in place and emits them on
/// `success`.
pub fn map_items_node<F>(f: F) -> Arc<dyn NodeExecutor>
where
    F: Fn(&mut ExecutionItem) + Send + Sync + 'static,
{
    Arc::new(FnExecutor(move |arg: NodeArg<'_>| {
        let mut items = arg.input;
        for item in &mut items {
            f(item);
        }
        success_output(items)
    }))
}

/// Custom node that routes each item to the signal the closure returns.
pub fn route_items_node<F>(f: F) -> Arc<dyn NodeExecutor>
where
    F: Fn(&ExecutionItem) -> String + Send + Sync + 'static,
{
    Arc::new(FnExecutor(move |arg: NodeArg<'_>| {
        let mut output = NodeOutput::new();
        for item in arg.input {
            let signal = f(&item);
            output.entry(signal).or_default().push(item);
        }
        output
    }))
}
