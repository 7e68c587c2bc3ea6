//! Bridge client tests against an in-memory transport.

use autodeck_core::{BridgeClient, BridgeError};
use autodeck_workflow::JsonObject;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Emulates the companion process on the far side of a duplex pipe:
/// announces `ready`, accepts `init`, then serves actions.
async fn fake_bridge(stream: tokio::io::DuplexStream) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"{\"signal\":\"ready\"}\n").await.unwrap();

    while let Ok(Some(line)) = lines.next_line().await {
        let req: Value = serde_json::from_str(&line).unwrap();
        let action = req["action"].as_str().unwrap_or_default();
        let response = match action {
            "init" => json!({"signal": "success"}),
            "echo" => {
                // Hold the reply briefly so concurrent callers overlap.
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                json!({"signal": "success", "output": {"received": req["params"]["i"]}})
            }
            "fail" => json!({"signal": "error", "error": "device offline"}),
            "garbage" => {
                writer.write_all(b"not json\n").await.unwrap();
                continue;
            }
            "shutdown" => return,
            _ => json!({"signal": "success"}),
        };
        writer
            .write_all(format!("{response}\n").as_bytes())
            .await
            .unwrap();
    }
}

async fn connect_fake() -> BridgeClient {
    let (client_io, server_io) = tokio::io::duplex(4096);
    tokio::spawn(fake_bridge(server_io));
    let (reader, writer) = tokio::io::split(client_io);
    BridgeClient::connect(reader, writer, "android", None)
        .await
        .expect("handshake should succeed")
}

fn params(entries: &[(&str, Value)]) -> JsonObject {
    let mut map = JsonObject::new();
    for (k, v) in entries {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

/// Concurrent callers each receive the response to their own request;
/// request/response pairing never crosses callers.
#[tokio::test]
async fn test_call_serialization() {
    let bridge = connect_fake().await;
    let cancel = CancellationToken::new();

    let mut tasks = Vec::new();
    for k in [1i64, 2] {
        let bridge = bridge.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let resp = bridge
                .call("echo", params(&[("i", json!(k))]), &cancel)
                .await
                .expect("call should succeed");
            (k, resp)
        }));
    }

    for task in tasks {
        let (k, resp) = task.await.expect("join");
        assert_eq!(resp.signal, "success");
        let output = resp.output.expect("echo output");
        assert_eq!(output["received"], json!(k), "caller {k} got a foreign reply");
    }

    bridge.close().await;
}

/// A non-empty error field is a logical error, not fatal to the bridge.
#[tokio::test]
async fn test_logical_error_keeps_bridge_alive() {
    let bridge = connect_fake().await;
    let cancel = CancellationToken::new();

    let resp = bridge
        .call("fail", JsonObject::new(), &cancel)
        .await
        .expect("transport should survive a logical error");
    assert!(resp.is_error());
    assert_eq!(resp.error.as_deref(), Some("device offline"));

    // The bridge still answers afterwards.
    let resp = bridge
        .call("echo", params(&[("i", json!(7))]), &cancel)
        .await
        .expect("follow-up call");
    assert_eq!(resp.output.unwrap()["received"], json!(7));

    bridge.close().await;
}

/// An unparseable line is fatal for the pending call and closes the client.
#[tokio::test]
async fn test_unparseable_line_is_fatal() {
    let bridge = connect_fake().await;
    let cancel = CancellationToken::new();

    let err = bridge
        .call("garbage", JsonObject::new(), &cancel)
        .await
        .expect_err("garbage response must fail the call");
    assert!(matches!(err, BridgeError::Protocol(..)));

    let err = bridge
        .call("echo", params(&[("i", json!(1))]), &cancel)
        .await
        .expect_err("client is closed after a wire-format violation");
    assert!(matches!(err, BridgeError::Closed));
}

/// Cancellation is checked before a request is issued.
#[tokio::test]
async fn test_cancelled_before_issue() {
    let bridge = connect_fake().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = bridge
        .call("echo", params(&[("i", json!(1))]), &cancel)
        .await
        .expect_err("cancelled call must not reach the pipe");
    assert!(matches!(err, BridgeError::Cancelled));

    bridge.close().await;
}

/// A bridge that announces anything but `ready` fails the handshake.
#[tokio::test]
async fn test_bad_startup_signal() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let (_reader, mut writer) = tokio::io::split(server_io);
        writer.write_all(b"{\"signal\":\"hello\"}\n").await.unwrap();
    });

    let (reader, writer) = tokio::io::split(client_io);
    let err = BridgeClient::connect(reader, writer, "android", None)
        .await
        .expect_err("handshake must fail");
    assert!(matches!(err, BridgeError::Handshake(_)));
}

/// A failed init is fatal.
#[tokio::test]
async fn test_failed_init() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let (reader, mut writer) = tokio::io::split(server_io);
        let mut lines = BufReader::new(reader).lines();
        writer.write_all(b"{\"signal\":\"ready\"}\n").await.unwrap();
        let _ = lines.next_line().await;
        writer
            .write_all(b"{\"signal\":\"error\",\"error\":\"no device\"}\n")
            .await
            .unwrap();
    });

    let (reader, writer) = tokio::io::split(client_io);
    let err = BridgeClient::connect(reader, writer, "android", Some("emulator-5554"))
        .await
        .expect_err("init failure must be fatal");
    match err {
        BridgeError::Handshake(msg) => assert!(msg.contains("no device")),
        other => panic!("unexpected error: {other}"),
    }
}
