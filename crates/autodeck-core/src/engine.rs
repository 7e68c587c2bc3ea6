//! Signal-routed flow engine.
//!
//! The engine drains a work queue of `(node-id, data)` packets in one
//! logical thread of control: pop, evaluate, store the node's result,
//! synthesize a step, then enqueue every edge matching an emitted non-empty
//! signal. Cycles are permitted; they terminate naturally once a node emits
//! only empty outputs. No cycle detection is performed.

use autodeck_workflow::{
    seed_data, ExecutionData, ExecutionResult, ExecutionStep, NodeOutput, RunContext, StepStatus,
    Workflow,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::executor::{ExecutorMap, Logger, NodeArg, NodeExecutor};
use crate::nodes::wire_builtin_executors;

/// Observer invoked after every node evaluation.
pub type StepCallback = Box<dyn Fn(&ExecutionStep) + Send + Sync>;

/// Executes one workflow to completion.
pub struct FlowEngine {
    workflow: Workflow,
    executors: ExecutorMap,
    on_step: Option<StepCallback>,
}

impl FlowEngine {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            executors: ExecutorMap::new(),
            on_step: None,
        }
    }

    /// Install a custom executor for one node. Wiring skips nodes that
    /// already have one.
    pub fn set_executor(&mut self, node_id: impl Into<String>, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(node_id.into(), executor);
    }

    /// Bind builtin executors for all unwired nodes.
    pub fn wire_builtin(&mut self, bridge: Option<crate::BridgeClient>, logger: Logger) {
        wire_builtin_executors(&self.workflow, bridge, logger, &mut self.executors);
    }

    /// Register the per-step observer.
    pub fn on_step(&mut self, callback: StepCallback) {
        self.on_step = Some(callback);
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Run with an arbitrary seed value (wrapped per the seeding rules).
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        input: Value,
    ) -> Result<ExecutionResult, EngineError> {
        self.execute_data(cancel, seed_data(input)).await
    }

    /// Run with pre-built execution data.
    pub async fn execute_data(
        &self,
        cancel: &CancellationToken,
        input: ExecutionData,
    ) -> Result<ExecutionResult, EngineError> {
        let start = self.workflow.start_node().ok_or(EngineError::NoStartNode)?;

        let mut run = RunContext::new(self.workflow.node_names());
        let mut queue: VecDeque<(String, ExecutionData)> = VecDeque::new();
        queue.push_back((start.id.clone(), input));

        let mut path: Vec<ExecutionStep> = Vec::new();
        let mut last_output = NodeOutput::new();

        while let Some((node_id, data)) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let Some(node) = self.workflow.node(&node_id) else {
                warn!(node_id = %node_id, "packet routed to unknown node, skipping");
                continue;
            };
            let executor = self
                .executors
                .get(&node_id)
                .ok_or_else(|| EngineError::NoExecutor(node.name.clone()))?;

            debug!(node = %node.name, kind = %node.kind, items = data.len(), "executing node");

            let started_at = chrono::Utc::now();
            let output = executor
                .execute(NodeArg {
                    input: data,
                    run: &mut run,
                    cancel,
                })
                .await;
            let finished_at = chrono::Utc::now();

            run.results.insert(node_id.clone(), output.clone());

            let mut step = ExecutionStep::from_output(
                &node.id,
                &node.name,
                &node.kind,
                output.clone(),
                started_at,
                finished_at,
            );
            let cancelled = cancel.is_cancelled();
            if cancelled {
                step.status = StepStatus::Cancelled;
            }
            if let Some(callback) = &self.on_step {
                callback(&step);
            }
            if cancelled {
                return Err(EngineError::Cancelled);
            }

            for (signal, out_data) in &output {
                if out_data.is_empty() {
                    continue;
                }
                for edge in self.workflow.edges_from(&node_id, signal) {
                    queue.push_back((edge.to_node_id.clone(), out_data.clone()));
                }
            }

            last_output = output;
            path.push(step);
        }

        Ok(ExecutionResult {
            output: last_output,
            execution_path: path,
        })
    }
}
