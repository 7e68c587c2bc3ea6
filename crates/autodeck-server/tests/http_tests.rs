//! Router-level tests exercising status mapping and CRUD round-trips.

use autodeck_process::ExecutorCommand;
use autodeck_server::{router, AppState, ServerConfig};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_router() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        core_path: dir.path().to_path_buf(),
        executor: ExecutorCommand::binary("echo"),
        bridge_program: "python".to_string(),
        bridge_args: Vec::new(),
        adb_path: "adb".to_string(),
    };
    let state = AppState::new(config).expect("state");
    (dir, router(state))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request"),
    };

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn script_crud_over_http() {
    let (_dir, router) = test_router();

    let (status, body) = send(&router, "GET", "/api/scripts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = send(
        &router,
        "POST",
        "/api/scripts",
        Some(json!({"name": "demo", "platform": "android"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, "GET", "/api/scripts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "demo");
    assert_eq!(body[0]["platform"], "android");

    let (status, body) = send(&router, "GET", "/api/scripts/demo/content", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["content"].as_str().unwrap().contains("def main"));

    let (status, _) = send(&router, "DELETE", "/api/scripts/demo", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_script_status_codes() {
    let (_dir, router) = test_router();

    // Empty name -> validation error.
    let (status, _) = send(&router, "POST", "/api/scripts", Some(json!({"name": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Duplicate -> conflict with a suggested name.
    let (_, _) = send(&router, "POST", "/api/scripts", Some(json!({"name": "demo"}))).await;
    let (status, body) =
        send(&router, "POST", "/api/scripts", Some(json!({"name": "demo"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["suggestedName"], "demo_1");
}

#[tokio::test]
async fn path_escape_is_forbidden() {
    let (_dir, router) = test_router();
    send(&router, "POST", "/api/scripts", Some(json!({"name": "demo"}))).await;

    let (status, _) = send(
        &router,
        "GET",
        "/api/scripts/demo/assets/raw?path=../../secret.txt",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stop_unknown_run_is_not_found() {
    let (_dir, router) = test_router();
    let (status, _) = send(
        &router,
        "POST",
        "/api/stop",
        Some(json!({"runId": "missing-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn workflow_crud_roundtrip() {
    let (_dir, router) = test_router();

    let workflow = json!({
        "id": "wf1",
        "projectId": "p1",
        "name": "Flow",
        "description": "",
        "platform": "android",
        "nodes": {
            "n1": {"id": "n1", "name": "Log", "kind": "log", "config": {"message": "hi"}, "x": 0.0, "y": 0.0}
        },
        "edges": [],
        "startNodeId": "n1"
    });

    let (status, _) = send(&router, "POST", "/api/workflows", Some(workflow.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, "GET", "/api/workflows/wf1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "wf1");
    assert_eq!(body["nodes"]["n1"]["kind"], "log");
    assert_eq!(body["startNodeId"], "n1");

    let (status, _) = send(&router, "GET", "/api/workflows/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A workflow with a dangling edge is rejected.
    let mut invalid = workflow.clone();
    invalid["id"] = json!("wf2");
    invalid["edges"] = json!([{"fromNodeId": "n1", "toNodeId": "ghost", "signal": "success"}]);
    let (status, _) = send(&router, "POST", "/api/workflows", Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn project_crud_and_cascade() {
    let (_dir, router) = test_router();

    let (status, _) = send(
        &router,
        "POST",
        "/api/projects",
        Some(json!({"id": "p1", "name": "Project", "platform": "android", "description": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let workflow = json!({
        "id": "wf1",
        "projectId": "p1",
        "name": "Flow",
        "platform": "",
        "nodes": {},
        "edges": [],
        "startNodeId": ""
    });
    send(&router, "POST", "/api/workflows", Some(workflow)).await;

    let (status, body) = send(&router, "GET", "/api/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["workflows"][0]["id"], "wf1");

    let (status, _) = send(&router, "DELETE", "/api/projects/p1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, "GET", "/api/workflows/wf1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_asset_json_base64() {
    let (_dir, router) = test_router();
    send(&router, "POST", "/api/scripts", Some(json!({"name": "demo"}))).await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/scripts/demo/assets",
        Some(json!({"path": "images/icon.png", "data": "cG5nLWJ5dGVz"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paths"][0], "images/icon.png");

    let (status, body) = send(&router, "GET", "/api/scripts/demo/assets", None).await;
    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["path"].as_str())
        .collect();
    assert!(paths.contains(&"images/icon.png"));
}
