//! Run orchestration: binds script and workflow definitions to runs.
//!
//! Script runs spawn one executor process whose pipes feed the run's log
//! bus. Workflow runs drive the flow engine in a background task, start a
//! bridge when any node needs one, publish each execution step as a log
//! envelope, and always emit one terminal envelope before the bus closes.

use autodeck_core::{BridgeClient, EngineError, FlowEngine, Logger};
use autodeck_process::{
    spawn_script_run, LogBus, LogKind, RunHandle, RunKind, RunRegistry,
};
use autodeck_workflow::Workflow;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::store::WorkflowStore;

/// Binds definitions to runs and owns their registry.
pub struct Orchestrator {
    config: ServerConfig,
    pub registry: Arc<RunRegistry>,
    store: Arc<WorkflowStore>,
}

impl Orchestrator {
    pub fn new(config: ServerConfig, registry: Arc<RunRegistry>, store: Arc<WorkflowStore>) -> Self {
        Self {
            config,
            registry,
            store,
        }
    }

    /// Start one script run; returns its run id.
    pub fn start_script_run(
        &self,
        script_id: &str,
        params: Option<&str>,
    ) -> Result<String, ApiError> {
        if script_id.is_empty() {
            return Err(ApiError::Validation("scriptId is required".into()));
        }

        let run_id = RunRegistry::make_run_id(script_id);
        let (bus, rx) = LogBus::new();
        let cancel = CancellationToken::new();

        let pid = spawn_script_run(&self.config.executor, script_id, params, bus, cancel.clone())?;

        self.registry.register(RunHandle::new(
            run_id.clone(),
            RunKind::Script,
            cancel,
            rx,
            Some(pid),
        ))?;
        Ok(run_id)
    }

    /// Start one workflow run in the background; returns its run id.
    pub fn start_workflow_run(
        &self,
        workflow_id: &str,
        device_id: Option<String>,
    ) -> Result<String, ApiError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .ok_or_else(|| ApiError::NotFound(format!("workflow not found: {workflow_id}")))?;
        workflow
            .validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let run_id = RunRegistry::make_run_id(&workflow.id);
        let (bus, rx) = LogBus::new();
        let cancel = CancellationToken::new();

        self.registry.register(RunHandle::new(
            run_id.clone(),
            RunKind::Workflow,
            cancel.clone(),
            rx,
            None,
        ))?;

        let config = self.config.clone();
        let registry = self.registry.clone();
        let spawned_run_id = run_id.clone();
        tokio::spawn(async move {
            run_workflow(workflow, device_id, config, bus, cancel).await;
            registry.remove(&spawned_run_id);
        });

        Ok(run_id)
    }

    /// Cancel a run by id.
    pub fn stop_run(&self, run_id: &str) -> Result<(), ApiError> {
        Ok(self.registry.cancel(run_id)?)
    }
}

/// Drive one workflow run to completion, closing the bridge and the log
/// bus on every exit path.
async fn run_workflow(
    workflow: Workflow,
    device_id: Option<String>,
    config: ServerConfig,
    bus: LogBus,
    cancel: CancellationToken,
) {
    let logger: Logger = {
        let bus = bus.clone();
        Arc::new(move |msg: &str| bus.publish(msg.to_string()))
    };

    let bridge = if workflow.needs_bridge() {
        let platform = if workflow.platform.is_empty() {
            "android"
        } else {
            workflow.platform.as_str()
        };
        match BridgeClient::spawn(
            &config.bridge_program,
            &config.bridge_args,
            platform,
            device_id.as_deref(),
            logger.clone(),
        )
        .await
        {
            Ok(bridge) => Some(bridge),
            Err(e) => {
                bus.publish_envelope(LogKind::Error, format!("Workflow failed: {e}"));
                return;
            }
        }
    } else {
        None
    };

    let mut engine = FlowEngine::new(workflow);
    engine.wire_builtin(bridge.clone(), logger);

    let step_bus = bus.clone();
    engine.on_step(Box::new(move |step| {
        match serde_json::to_string(step) {
            Ok(json) => step_bus.publish_envelope(LogKind::ExecutionStep, json),
            Err(e) => tracing::warn!("failed to serialize execution step: {e}"),
        }
    }));

    let result = engine.execute(&cancel, Value::Null).await;
    match result {
        Ok(result) => {
            bus.publish_envelope(
                LogKind::Status,
                format!("Workflow complete ({} steps)", result.execution_path.len()),
            );
        }
        Err(EngineError::Cancelled) => {
            bus.publish_envelope(LogKind::Status, "Workflow cancelled");
        }
        Err(e) => {
            bus.publish_envelope(LogKind::Error, format!("Workflow failed: {e}"));
        }
    }

    if let Some(bridge) = bridge {
        bridge.close().await;
    }
    // `bus` drops here; once node loggers are gone the channel closes.
}
