//! Typed error hierarchy for the coordination service.
//!
//! Two top-level enums cover the two lifecycles a failure can go through:
//! - `ApiError` — per-request failures, convertible straight to an HTTP response
//! - `StartupError` — failures that abort the process before it ever binds a socket

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to an HTTP caller. Each variant maps to exactly one status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("swarm not found: {0}")]
    NotFound(String),

    #[error("duplicate packet_id {packet_id} for swarm {swarm_id}")]
    Conflict { swarm_id: String, packet_id: i64 },

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldError]>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, fields): (StatusCode, &str, Option<Vec<FieldError>>) = match &self {
            ApiError::Validation(fields) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", Some(fields.clone()))
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            ApiError::Conflict { .. } => (StatusCode::CONFLICT, "conflict", None),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "store error while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
        };

        let body = ErrorBody {
            error,
            fields: fields.as_deref(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Store(err)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Store(err.into())
    }
}

/// Failures that can occur before the server accepts its first connection. These are never
/// turned into an HTTP response; `main` logs them with context and exits non-zero.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("failed to open database at {path}: {source}")]
    Database {
        path: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_422() {
        let err = ApiError::Validation(vec![FieldError::new("tasks_total", "must be >= 1")]);
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::NotFound("swarm-x".to_string());
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ApiError::Conflict {
            swarm_id: "swarm-x".to_string(),
            packet_id: 1,
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn store_error_maps_to_500() {
        let err = ApiError::Store(anyhow::anyhow!("disk full"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn startup_error_messages_carry_context() {
        let err = StartupError::Bind {
            addr: "127.0.0.1:7432".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:7432"));
    }
}
