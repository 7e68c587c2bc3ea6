//! HTTP/WebSocket surface.
//!
//! Thin request adaptor over the stores and the orchestrator; status
//! mapping lives in [`crate::error::ApiError`].

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use autodeck_process::RunRegistry;
use autodeck_workflow::Workflow;

use crate::archive;
use crate::config::ServerConfig;
use crate::devices;
use crate::error::ApiError;
use crate::orchestrator::Orchestrator;
use crate::scripts::ScriptStore;
use crate::store::{ProjectRecord, WorkflowStore};

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<RunRegistry>,
    pub scripts: Arc<ScriptStore>,
    pub store: Arc<WorkflowStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config.core_path.join("script").join("custom"))?;

        let registry = Arc::new(RunRegistry::new());
        let scripts = Arc::new(ScriptStore::new(&config.core_path));
        let store = Arc::new(WorkflowStore::new());
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            registry.clone(),
            store.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            scripts,
            store,
            orchestrator,
        })
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/scripts", get(list_scripts).post(create_script))
        .route("/run", post(run_script))
        .route("/stop", post(stop_run))
        .route("/devices", get(get_devices))
        .route("/devices/:id/screenshot", get(device_screenshot))
        .route("/scripts/:id", delete(delete_script))
        .route(
            "/scripts/:id/content",
            get(get_script_content).post(save_script_content),
        )
        .route("/scripts/:id/rename", post(rename_script))
        .route(
            "/scripts/:id/assets",
            get(list_assets).post(upload_asset).delete(delete_asset),
        )
        .route("/scripts/:id/assets/rename", post(rename_asset))
        .route("/scripts/:id/assets/mkdir", post(mkdir_asset))
        .route("/scripts/:id/assets/move", post(move_asset))
        .route("/scripts/:id/assets/create", post(create_asset))
        .route("/scripts/:id/assets/raw", get(asset_raw))
        .route("/scripts/:id/export", get(export_script))
        .route("/scripts/import", post(import_script))
        .route("/workflows", get(list_workflows).post(save_workflow))
        .route("/workflows/:id", get(get_workflow).delete(delete_workflow))
        .route("/workflows/:id/rename", post(rename_workflow))
        .route("/workflows/:id/run", post(run_workflow))
        .route("/projects", get(list_projects).post(save_project))
        .route("/projects/:id", delete(delete_project))
        .route("/projects/:id/rename", post(rename_project))
        .route("/adb/status", get(adb_status))
        .route("/adb/start", post(adb_start))
        .route("/adb/stop", post(adb_stop))
        .route("/adb/command", post(adb_command));

    Router::new()
        .nest("/api", api)
        .route("/ws/logs/:id", get(stream_logs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── scripts ──────────────────────────────────────────────────────────────

async fn list_scripts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scripts.list()?))
}

#[derive(Deserialize)]
struct CreateScriptRequest {
    name: String,
    #[serde(default)]
    platform: String,
}

async fn create_script(
    State(state): State<AppState>,
    Json(req): Json<CreateScriptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.scripts.create(&req.name, &req.platform)?;
    Ok(Json(json!({"status": "created", "name": record.id})))
}

async fn delete_script(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.scripts.delete(&id)?;
    Ok(Json(json!({"status": "deleted"})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameRequest {
    new_name: String,
}

async fn rename_script(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.scripts.rename(&id, &req.new_name)?;
    Ok(Json(json!({"status": "renamed"})))
}

#[derive(Deserialize)]
struct PathQuery {
    path: Option<String>,
}

async fn get_script_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state.scripts.content(&id, query.path.as_deref())?;
    Ok(Json(json!({"content": content})))
}

#[derive(Deserialize)]
struct SaveContentRequest {
    content: String,
}

async fn save_script_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
    Json(req): Json<SaveContentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .scripts
        .save_content(&id, query.path.as_deref(), &req.content)?;
    Ok(Json(json!({"status": "saved"})))
}

// ── runs ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    script_id: String,
    #[serde(default)]
    params: Option<String>,
}

async fn run_script(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let run_id = state
        .orchestrator
        .start_script_run(&req.script_id, req.params.as_deref())?;
    Ok(Json(json!({"runId": run_id})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest {
    run_id: String,
}

async fn stop_run(
    State(state): State<AppState>,
    Json(req): Json<StopRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.stop_run(&req.run_id)?;
    Ok(Json(json!({"status": "stopped"})))
}

// ── devices ──────────────────────────────────────────────────────────────

async fn get_devices(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(devices::list_devices(&state.config.adb_path).await?))
}

async fn device_screenshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let png = devices::screenshot(&state.config.adb_path, &id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

async fn adb_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(devices::adb_status(&state.config.adb_path).await)
}

async fn adb_start(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    devices::start_adb(&state.config.adb_path).await?;
    Ok(Json(json!({"status": "started"})))
}

async fn adb_stop(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    devices::stop_adb(&state.config.adb_path).await?;
    Ok(Json(json!({"status": "stopped"})))
}

#[derive(Deserialize)]
struct AdbCommandRequest {
    command: String,
}

async fn adb_command(
    State(state): State<AppState>,
    Json(req): Json<AdbCommandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let output = devices::adb_command(&state.config.adb_path, &req.command).await?;
    Ok(Json(json!({"output": output})))
}

// ── assets ───────────────────────────────────────────────────────────────

async fn list_assets(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scripts.list_assets(&id)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetRenameRequest {
    old_name: String,
    new_name: String,
}

async fn rename_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssetRenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.scripts.rename_asset(&id, &req.old_name, &req.new_name)?;
    Ok(Json(json!({"status": "ok"})))
}

async fn delete_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rel = query
        .path
        .ok_or_else(|| ApiError::Validation("path is required".into()))?;
    state.scripts.delete_asset(&id, &rel)?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Deserialize)]
struct PathRequest {
    path: String,
}

async fn mkdir_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.scripts.mkdir(&id, &req.path)?;
    Ok(Json(json!({"status": "ok"})))
}

async fn create_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.scripts.create_asset(&id, &req.path)?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Deserialize)]
struct MoveRequest {
    from: String,
    to: String,
}

async fn move_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MoveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.scripts.move_asset(&id, &req.from, &req.to)?;
    Ok(Json(json!({"status": "ok"})))
}

async fn asset_raw(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rel = query
        .path
        .ok_or_else(|| ApiError::Validation("path is required".into()))?;
    let data = state.scripts.read_asset(&id, &rel)?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

#[derive(Deserialize)]
struct UploadJsonRequest {
    path: String,
    /// Base64-encoded file content.
    data: String,
}

/// Accepts multipart (`file` field plus optional `path` directory) or JSON
/// with base64 `data`.
async fn upload_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let mut dir = "images".to_string();
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(e.to_string()))?
        {
            let name = field.name().map(ToString::to_string);
            match name.as_deref() {
                Some("path") => {
                    dir = field
                        .text()
                        .await
                        .map_err(|e| ApiError::Validation(e.to_string()))?;
                }
                Some("file") => {
                    let file_name = field
                        .file_name()
                        .map(ToString::to_string)
                        .ok_or_else(|| ApiError::Validation("file name is required".into()))?;
                    let file_name = std::path::Path::new(&file_name)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .ok_or_else(|| ApiError::Validation("invalid file name".into()))?;
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(e.to_string()))?;
                    files.push((file_name, bytes.to_vec()));
                }
                _ => {}
            }
        }

        if files.is_empty() {
            return Err(ApiError::Validation("no file uploaded".into()));
        }

        let mut paths = Vec::new();
        for (file_name, bytes) in files {
            let rel = if dir.is_empty() {
                file_name
            } else {
                format!("{}/{}", dir.trim_end_matches('/'), file_name)
            };
            state.scripts.write_asset(&id, &rel, &bytes)?;
            paths.push(rel);
        }
        return Ok(Json(json!({"status": "uploaded", "paths": paths})));
    }

    let bytes = axum::body::to_bytes(request.into_body(), 32 * 1024 * 1024)
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let req: UploadJsonRequest =
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Validation(e.to_string()))?;
    let data = base64::engine::general_purpose::STANDARD
        .decode(req.data.as_bytes())
        .map_err(|e| ApiError::Validation(format!("invalid base64 data: {e}")))?;
    state.scripts.write_asset(&id, &req.path, &data)?;
    Ok(Json(json!({"status": "uploaded", "paths": [req.path]})))
}

// ── import/export ────────────────────────────────────────────────────────

async fn export_script(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = archive::export_zip(&state.scripts, &id)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={id}.zip"),
            ),
        ],
        bytes,
    ))
}

async fn import_script(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<Vec<u8>> = None;
    let mut new_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("file") => {
                file = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(e.to_string()))?
                        .to_vec(),
                );
            }
            Some("newName") => {
                new_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::Validation(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::Validation("no file uploaded".into()))?;
    let id = archive::import_zip(&state.scripts, &file, new_name.as_deref())?;
    Ok(Json(json!({"status": "imported", "id": id})))
}

// ── workflows ────────────────────────────────────────────────────────────

async fn list_workflows(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list_workflows())
}

async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state
        .store
        .get_workflow(&id)
        .ok_or_else(|| ApiError::NotFound(format!("workflow not found: {id}")))?;
    Ok(Json(workflow))
}

async fn save_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> Result<impl IntoResponse, ApiError> {
    if workflow.id.is_empty() {
        return Err(ApiError::Validation("workflow id is required".into()));
    }
    workflow
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    state.store.save_workflow(workflow);
    Ok(Json(json!({"status": "saved"})))
}

async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.delete_workflow(&id) {
        return Err(ApiError::NotFound(format!("workflow not found: {id}")));
    }
    Ok(Json(json!({"status": "deleted"})))
}

async fn rename_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.rename_workflow(&id, &req.new_name) {
        return Err(ApiError::NotFound(format!("workflow not found: {id}")));
    }
    Ok(Json(json!({"status": "renamed"})))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RunWorkflowRequest {
    #[serde(default)]
    device_id: Option<String>,
}

async fn run_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RunWorkflowRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let device_id = body.and_then(|Json(req)| req.device_id);
    let run_id = state.orchestrator.start_workflow_run(&id, device_id)?;
    Ok(Json(json!({"runId": run_id})))
}

// ── projects ─────────────────────────────────────────────────────────────

async fn list_projects(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list_projects())
}

async fn save_project(
    State(state): State<AppState>,
    Json(project): Json<ProjectRecord>,
) -> Result<impl IntoResponse, ApiError> {
    if project.id.is_empty() {
        return Err(ApiError::Validation("project id is required".into()));
    }
    state.store.save_project(project);
    Ok(Json(json!({"status": "saved"})))
}

async fn rename_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.rename_project(&id, &req.new_name) {
        return Err(ApiError::NotFound(format!("project not found: {id}")));
    }
    Ok(Json(json!({"status": "renamed"})))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.delete_project(&id) {
        return Err(ApiError::NotFound(format!("project not found: {id}")));
    }
    Ok(Json(json!({"status": "deleted"})))
}

// ── log streaming ────────────────────────────────────────────────────────

/// Upgrade to a WebSocket and stream the run's log bus verbatim as text
/// frames; the socket closes when the bus does.
async fn stream_logs(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let logs = match state.registry.log_channel(&id) {
        Ok(logs) => logs,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "process not found"})),
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| forward_logs(socket, logs))
}

async fn forward_logs(mut socket: WebSocket, mut logs: autodeck_process::LogReceiver) {
    while let Some(line) = logs.recv().await {
        if socket.send(Message::Text(line)).await.is_err() {
            break;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}
