//! API error taxonomy and HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced at the HTTP boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request body, missing required id, bad parameters.
    #[error("{0}")]
    Validation(String),

    /// Unknown id.
    #[error("{0}")]
    NotFound(String),

    /// Path escape or protected resource.
    #[error("{0}")]
    Forbidden(String),

    /// Destination exists on rename/import; carries a free name.
    #[error("{name} already exists")]
    Conflict { name: String, suggested: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::Conflict { suggested, .. } => (
                StatusCode::CONFLICT,
                json!({ "error": self.to_string(), "suggestedName": suggested }),
            ),
            ApiError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": err.to_string() }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<autodeck_process::ProcessError> for ApiError {
    fn from(e: autodeck_process::ProcessError) -> Self {
        match e {
            autodeck_process::ProcessError::NotFound(id) => {
                ApiError::NotFound(format!("process not found: {id}"))
            }
            other => ApiError::Internal(anyhow::anyhow!(other)),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(anyhow::anyhow!(e))
    }
}
