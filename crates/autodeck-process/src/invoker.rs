//! Executor invoker: one external process per script run.
//!
//! Stdout lines travel to the log bus verbatim; stderr lines are wrapped
//! into `stderr` envelopes. On exit one terminal envelope is emitted
//! (`status` on clean exit, `error` otherwise) after both pipe readers
//! have drained, and the bus closes once every producer is gone.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::bus::{LogBus, LogKind};
use crate::error::ProcessError;
use crate::kill::kill_tree;

/// How to start the external executor.
///
/// Release installs ship a self-contained engine binary; development runs
/// an interpreter plus entry script.
#[derive(Debug, Clone)]
pub struct ExecutorCommand {
    pub program: String,
    pub entry_script: Option<String>,
    pub work_dir: Option<std::path::PathBuf>,
}

impl ExecutorCommand {
    /// Self-contained executor binary.
    pub fn binary(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            entry_script: None,
            work_dir: None,
        }
    }

    /// Interpreter + entry script (development mode).
    pub fn interpreter(program: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            entry_script: Some(entry.into()),
            work_dir: None,
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }
}

/// Spawn one script run and stream its output into `bus`.
///
/// Returns the child pid. Cancelling the token forcibly terminates the
/// whole process tree; a process that is already gone is not an error.
pub fn spawn_script_run(
    command: &ExecutorCommand,
    script_id: &str,
    params: Option<&str>,
    bus: LogBus,
    cancel: CancellationToken,
) -> Result<u32, ProcessError> {
    let mut cmd = Command::new(&command.program);
    if let Some(entry) = &command.entry_script {
        cmd.arg(entry);
    }
    cmd.args(["run", "--script", script_id]);
    if let Some(params) = params.filter(|p| !p.is_empty()) {
        cmd.args(["--params", params]);
    }
    if let Some(dir) = &command.work_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group so cancellation can kill the whole tree.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let pid = child.id().unwrap_or_default();
    tracing::info!(pid, script_id, "executor process started");

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = stdout.map(|pipe| {
        let bus = bus.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                bus.publish(line);
            }
        })
    });

    let stderr_task = stderr.map(|pipe| {
        let bus = bus.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                bus.publish_envelope(LogKind::Stderr, line);
            }
        })
    });

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                tracing::info!(pid, "run cancelled, killing process tree");
                kill_tree(pid);
                child.wait().await
            }
        };

        // Drain both pipes before the terminal envelope.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        match status {
            Ok(s) if s.success() => {
                bus.publish_envelope(LogKind::Status, "Process exited");
            }
            Ok(s) => {
                bus.publish_envelope(LogKind::Error, format!("Process exited with error: {s}"));
            }
            Err(e) => {
                bus.publish_envelope(LogKind::Error, format!("Process exited with error: {e}"));
            }
        }
        // Last producer handle drops here, closing the bus.
    });

    Ok(pid)
}
