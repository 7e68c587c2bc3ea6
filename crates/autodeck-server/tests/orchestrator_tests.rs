//! Orchestrator tests: workflow and script runs end-to-end through the
//! registry and the log bus.

use autodeck_process::{ExecutorCommand, LogEnvelope, LogKind, LogReceiver};
use autodeck_server::{AppState, ServerConfig};
use autodeck_workflow::{ExecutionStep, Node, Workflow};
use serde_json::json;
use std::path::Path;

fn test_config(core: &Path, executor: ExecutorCommand) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        core_path: core.to_path_buf(),
        executor,
        bridge_program: "python".to_string(),
        bridge_args: Vec::new(),
        adb_path: "adb".to_string(),
    }
}

fn state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path(), ExecutorCommand::binary("echo"));
    let state = AppState::new(config).expect("state");
    (dir, state)
}

async fn drain(mut rx: LogReceiver) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }
    lines
}

fn sleep_workflow(id: &str) -> Workflow {
    let mut wf = Workflow::new("Sleeper");
    wf.id = id.to_string();
    wf.add_node(Node::new("n1", "Sleep", "sleep").with_config("seconds", json!(30.0)));
    wf.start_node_id = "n1".to_string();
    wf
}

fn log_workflow(id: &str) -> Workflow {
    let mut wf = Workflow::new("Logger");
    wf.id = id.to_string();
    wf.add_node(
        Node::new("n1", "Say", "log")
            .with_config("message", json!("hi"))
            .with_config("type", json!("info")),
    );
    wf.start_node_id = "n1".to_string();
    wf
}

/// Cancelling a workflow mid-sleep emits a `status` envelope matching
/// /cancelled/i and closes the bus promptly.
#[tokio::test]
async fn workflow_cancellation_terminates_run() {
    let (_dir, state) = state();
    state.store.save_workflow(sleep_workflow("wf1"));

    let run_id = state
        .orchestrator
        .start_workflow_run("wf1", None)
        .expect("start");
    let rx = state.registry.log_channel(&run_id).expect("log channel");

    let started = std::time::Instant::now();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    state.orchestrator.stop_run(&run_id).expect("stop");

    let lines = drain(rx).await;
    assert!(
        started.elapsed() < std::time::Duration::from_millis(2000),
        "cancellation should end the run promptly"
    );

    let terminal: LogEnvelope =
        serde_json::from_str(lines.last().expect("terminal envelope")).expect("envelope json");
    assert_eq!(terminal.kind, LogKind::Status);
    assert!(
        terminal.message.to_lowercase().contains("cancelled"),
        "terminal message was: {}",
        terminal.message
    );
}

/// A completed run publishes node log lines, one execution_step envelope
/// per node, and a terminal complete envelope.
#[tokio::test]
async fn workflow_completion_publishes_steps() {
    let (_dir, state) = state();
    state.store.save_workflow(log_workflow("wf1"));

    let run_id = state
        .orchestrator
        .start_workflow_run("wf1", None)
        .expect("start");
    let rx = state.registry.log_channel(&run_id).expect("log channel");

    let lines = drain(rx).await;

    assert!(
        lines.iter().any(|l| l == "[workflow][info] hi"),
        "node log line should be on the bus verbatim: {lines:?}"
    );

    let envelopes: Vec<LogEnvelope> = lines
        .iter()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();

    let step_envelope = envelopes
        .iter()
        .find(|e| e.kind == LogKind::ExecutionStep)
        .expect("one execution_step envelope");
    let step: ExecutionStep =
        serde_json::from_str(&step_envelope.message).expect("step payload");
    assert_eq!(step.node_id, "n1");
    assert_eq!(step.node_kind, "log");

    let terminal = envelopes.last().expect("terminal envelope");
    assert_eq!(terminal.kind, LogKind::Status);
    assert!(terminal.message.contains("complete"));
}

/// Unknown workflow ids are rejected up front.
#[tokio::test]
async fn unknown_workflow_is_not_found() {
    let (_dir, state) = state();
    let result = state.orchestrator.start_workflow_run("missing", None);
    assert!(matches!(
        result,
        Err(autodeck_server::ApiError::NotFound(_))
    ));
}

/// Script runs pipe executor stdout into the bus and register a handle.
#[cfg(unix)]
#[tokio::test]
async fn script_run_streams_and_registers() {
    let (_dir, state) = state();

    let run_id = state
        .orchestrator
        .start_script_run("demo", Some("x=1"))
        .expect("start");
    assert!(run_id.starts_with("demo-"));
    assert!(state.registry.lookup(&run_id).is_some());

    let rx = state.registry.log_channel(&run_id).expect("log channel");
    let lines = drain(rx).await;

    assert_eq!(lines[0], "run --script demo --params x=1");
    let terminal: LogEnvelope = serde_json::from_str(lines.last().unwrap()).expect("envelope");
    assert_eq!(terminal.kind, LogKind::Status);
}
