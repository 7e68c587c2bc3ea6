//! Client for the bridge companion process.
//!
//! The bridge is a long-lived subprocess addressed by line-delimited JSON
//! over its stdio. One owning task holds both pipes; callers post request
//! envelopes through a mailbox and await the reply, which serializes
//! write-then-read cycles (at most one in-flight request).
//!
//! Startup handshake: the bridge emits one unsolicited `{"signal":"ready"}`
//! line, then an `init` request with platform and optional device id must
//! answer `success`. Shutdown sends the `shutdown` action and closes stdin.

use autodeck_workflow::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::executor::Logger;

/// One JSON line sent to the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeRequest {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonObject>,
}

/// One JSON line received from the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub signal: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BridgeResponse {
    /// Whether the bridge reported a logical error for this call.
    pub fn is_error(&self) -> bool {
        self.error.as_deref().map(|e| !e.is_empty()).unwrap_or(false)
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to start bridge: {0}")]
    Spawn(String),

    #[error("bridge handshake failed: {0}")]
    Handshake(String),

    #[error("bridge is closed")]
    Closed,

    #[error("bridge i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse bridge response: {0} (raw: {1})")]
    Protocol(String, String),

    #[error("bridge call cancelled")]
    Cancelled,
}

enum BridgeMsg {
    Call {
        req: BridgeRequest,
        reply: oneshot::Sender<Result<BridgeResponse, BridgeError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the bridge actor. Cheap to clone; all clones share the same
/// serialized request stream.
#[derive(Clone, Debug)]
pub struct BridgeClient {
    tx: mpsc::Sender<BridgeMsg>,
}

impl BridgeClient {
    /// Spawn the bridge subprocess and perform the startup handshake.
    pub async fn spawn(
        program: &str,
        args: &[String],
        platform: &str,
        device_id: Option<&str>,
        logger: Logger,
    ) -> Result<Self, BridgeError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| BridgeError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Spawn("failed to open bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Spawn("failed to open bridge stdout".into()))?;

        // Forward bridge diagnostics in the background.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    logger(&format!("[bridge] {line}"));
                }
            });
        }

        tracing::info!(pid = child.id(), "bridge process started");
        Self::start(stdout, stdin, Some(child), platform, device_id).await
    }

    /// Connect over arbitrary transport (used by tests with an in-memory
    /// duplex, and by embedders that manage the process themselves).
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        platform: &str,
        device_id: Option<&str>,
    ) -> Result<Self, BridgeError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::start(reader, writer, None, platform, device_id).await
    }

    async fn start<R, W>(
        reader: R,
        mut writer: W,
        mut child: Option<Child>,
        platform: &str,
        device_id: Option<&str>,
    ) -> Result<Self, BridgeError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut lines = BufReader::new(reader).lines();

        let result = Self::handshake(&mut lines, &mut writer, platform, device_id).await;
        if let Err(e) = result {
            if let Some(c) = child.as_mut() {
                let _ = c.start_kill();
            }
            return Err(e);
        }

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(run_actor(lines, writer, child, rx));
        Ok(Self { tx })
    }

    async fn handshake<R, W>(
        lines: &mut Lines<BufReader<R>>,
        writer: &mut W,
        platform: &str,
        device_id: Option<&str>,
    ) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ready = read_response(lines).await?;
        if ready.signal != "ready" {
            return Err(BridgeError::Handshake(format!(
                "unexpected startup signal: {}",
                ready.signal
            )));
        }

        let mut params = JsonObject::new();
        params.insert("platform".into(), Value::String(platform.to_string()));
        if let Some(device) = device_id {
            params.insert("device_id".into(), Value::String(device.to_string()));
        }
        write_request(
            writer,
            &BridgeRequest {
                action: "init".into(),
                params: Some(params),
            },
        )
        .await?;

        let init = read_response(lines).await?;
        if init.signal != "success" {
            return Err(BridgeError::Handshake(
                init.error
                    .unwrap_or_else(|| format!("init returned signal {}", init.signal)),
            ));
        }
        tracing::info!(platform, "bridge initialised");
        Ok(())
    }

    /// Send one action and wait for its response.
    ///
    /// Cancellation is checked before issuing; a call that has already been
    /// written is still drained by the actor before the next one starts.
    pub async fn call(
        &self,
        action: &str,
        params: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<BridgeResponse, BridgeError> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BridgeMsg::Call {
                req: BridgeRequest {
                    action: action.to_string(),
                    params: Some(params),
                },
                reply,
            })
            .await
            .map_err(|_| BridgeError::Closed)?;

        rx.await.map_err(|_| BridgeError::Closed)?
    }

    /// Graceful shutdown: `shutdown` action, stdin closed, bounded wait.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(BridgeMsg::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_actor<R, W>(
    mut lines: Lines<BufReader<R>>,
    mut writer: W,
    mut child: Option<Child>,
    mut rx: mpsc::Receiver<BridgeMsg>,
) where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    while let Some(msg) = rx.recv().await {
        match msg {
            BridgeMsg::Call { req, reply } => {
                let result = roundtrip(&mut writer, &mut lines, &req).await;
                let broken = result.is_err();
                let _ = reply.send(result);
                if broken {
                    break;
                }
            }
            BridgeMsg::Shutdown { reply } => {
                let _ = write_request(
                    &mut writer,
                    &BridgeRequest {
                        action: "shutdown".into(),
                        params: None,
                    },
                )
                .await;
                let _ = writer.shutdown().await;
                reap(&mut child).await;
                let _ = reply.send(());
                return;
            }
        }
    }

    // Pipe broken or every handle dropped: kill the process and fail any
    // queued callers.
    if let Some(mut c) = child.take() {
        let _ = c.start_kill();
        let _ = c.wait().await;
    }
    while let Some(msg) = rx.recv().await {
        match msg {
            BridgeMsg::Call { reply, .. } => {
                let _ = reply.send(Err(BridgeError::Closed));
            }
            BridgeMsg::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }
}

async fn roundtrip<R, W>(
    writer: &mut W,
    lines: &mut Lines<BufReader<R>>,
    req: &BridgeRequest,
) -> Result<BridgeResponse, BridgeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_request(writer, req).await?;
    read_response(lines).await
}

async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    req: &BridgeRequest,
) -> Result<(), BridgeError> {
    let mut line =
        serde_json::to_vec(req).map_err(|e| BridgeError::Protocol(e.to_string(), String::new()))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_response<R: AsyncRead + Unpin>(
    lines: &mut Lines<BufReader<R>>,
) -> Result<BridgeResponse, BridgeError> {
    match lines.next_line().await? {
        Some(line) => serde_json::from_str(&line)
            .map_err(|e| BridgeError::Protocol(e.to_string(), line.clone())),
        None => Err(BridgeError::Closed),
    }
}

/// Wait for the child to exit, killing it after a bounded grace period.
async fn reap(child: &mut Option<Child>) {
    if let Some(mut c) = child.take() {
        match tokio::time::timeout(std::time::Duration::from_secs(5), c.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = c.start_kill();
                let _ = c.wait().await;
            }
        }
        tracing::info!("bridge process stopped");
    }
}
