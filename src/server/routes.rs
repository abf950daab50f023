//! HTTP handlers for the coordination API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::{Json, Router};
use axum::routing::{get, post};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;

use crate::errors::ApiError;
use crate::protocol::{
    CompleteRequest, CompleteResponse, CreateSwarmRequest, ErrorRequest, ErrorResponse,
    HealthResponse, ProgressRequest, ProgressResponse, RegisterRequest, RegisterResponse,
    SwarmCreateResponse, SwarmStatusResponse, Validate, WorkerStatus as WorkerStatusView,
};
use crate::retry::{self, RetryPolicy};
use crate::state::StateManager;
use crate::state::models::RegisterOutcome;

pub struct AppState {
    pub store: Arc<StateManager>,
    pub retry_policy: RetryPolicy,
    pub sse_poll_interval: Duration,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn validated<T: Validate>(req: T) -> Result<T, ApiError> {
    let errors = req.validate();
    if errors.is_empty() {
        Ok(req)
    } else {
        Err(ApiError::Validation(errors))
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/swarm/create", post(create_swarm))
        .route("/swarm/{swarm_id}/register", post(register))
        .route("/swarm/{swarm_id}/progress", post(progress))
        .route("/swarm/{swarm_id}/complete", post(complete))
        .route("/swarm/{swarm_id}/error", post(report_error))
        .route("/swarm/{swarm_id}/status", get(status))
        .route("/swarm/{swarm_id}/events", get(events))
        .with_state(state)
}

async fn health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let (active_swarms, total_workers) = state.store.health_counts()?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_swarms,
        total_workers,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn create_swarm(
    State(state): State<SharedState>,
    Json(req): Json<CreateSwarmRequest>,
) -> Result<(StatusCode, Json<SwarmCreateResponse>), ApiError> {
    let req = validated(req)?;
    let swarm = state
        .store
        .create_swarm(&req.feature, &req.manifest_path, req.auto_merge, req.notify_on_complete)?;

    Ok((
        StatusCode::CREATED,
        Json(SwarmCreateResponse {
            endpoint: format!("/swarm/{}", swarm.swarm_id),
            swarm_id: swarm.swarm_id,
            created_at: swarm.created_at,
            auto_merge: swarm.auto_merge,
            notify_on_complete: swarm.notify_on_complete,
        }),
    ))
}

fn require_swarm(state: &SharedState, swarm_id: &str) -> Result<(), ApiError> {
    match state.store.get_swarm(swarm_id)? {
        Some(_) => Ok(()),
        None => Err(ApiError::NotFound(swarm_id.to_string())),
    }
}

async fn register(
    State(state): State<SharedState>,
    Path(swarm_id): Path<String>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let req = validated(req)?;
    require_swarm(&state, &swarm_id)?;

    match state
        .store
        .register_worker(&swarm_id, req.packet_id, &req.packet_name, req.tasks_total, &req.worktree)?
    {
        RegisterOutcome::Registered(worker) => Ok(Json(RegisterResponse {
            worker_id: worker.worker_id,
            swarm_id: worker.swarm_id,
            packet_id: worker.packet_id,
            status: worker.status.to_string(),
            created_at: worker.registered_at,
        })),
        RegisterOutcome::Conflict => Err(ApiError::Conflict {
            swarm_id,
            packet_id: req.packet_id,
        }),
    }
}

async fn progress(
    State(state): State<SharedState>,
    Path(swarm_id): Path<String>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let req = validated(req)?;
    require_swarm(&state, &swarm_id)?;

    state.store.update_progress(
        &swarm_id,
        req.packet_id,
        &req.task_id,
        &req.task_name,
        req.status.as_str(),
        req.tasks_completed,
        req.tasks_total,
        req.commit.as_deref(),
    )?;

    Ok(Json(ProgressResponse {
        swarm_id,
        packet_id: req.packet_id,
        tasks_completed: req.tasks_completed,
        tasks_total: req.tasks_total,
        created_at: now_iso(),
    }))
}

async fn complete(
    State(state): State<SharedState>,
    Path(swarm_id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let req = validated(req)?;
    require_swarm(&state, &swarm_id)?;

    let outcome = state.store.mark_complete(
        &swarm_id,
        req.packet_id,
        &req.final_commit,
        req.tests_passed,
        req.review_passed,
    )?;

    Ok(Json(CompleteResponse {
        swarm_id,
        packet_id: req.packet_id,
        swarm_complete: outcome.swarm_complete,
        remaining_workers: outcome.remaining_workers,
        created_at: now_iso(),
    }))
}

/// The server classifies recoverability from `error_type` via the same table the
/// orchestrator consults, rather than trusting the client-supplied `recoverable` flag.
async fn report_error(
    State(state): State<SharedState>,
    Path(swarm_id): Path<String>,
    Json(req): Json<ErrorRequest>,
) -> Result<Json<ErrorResponse>, ApiError> {
    let req = validated(req)?;
    require_swarm(&state, &swarm_id)?;

    let recoverable = retry::classify_error(&req.error_type) == retry::ErrorCategory::Recoverable;

    state.store.record_error(
        &swarm_id,
        req.packet_id,
        &req.task_id,
        &req.error_type,
        &req.message,
        recoverable,
    )?;

    let retry_in_seconds = recoverable.then(|| state.retry_policy.retry_delay_secs(1));

    Ok(Json(ErrorResponse {
        swarm_id,
        packet_id: req.packet_id,
        retry_scheduled: recoverable,
        retry_in_seconds,
        created_at: now_iso(),
    }))
}

async fn status(
    State(state): State<SharedState>,
    Path(swarm_id): Path<String>,
) -> Result<Json<SwarmStatusResponse>, ApiError> {
    let view = state
        .store
        .get_status(&swarm_id)?
        .ok_or_else(|| ApiError::NotFound(swarm_id.clone()))?;

    Ok(Json(SwarmStatusResponse {
        swarm_id: view.swarm.swarm_id,
        status: view.swarm.status.to_string(),
        workers_registered: view.workers_registered,
        workers_complete: view.workers_complete,
        workers_failed: view.workers_failed,
        workers: view
            .workers
            .into_iter()
            .map(|w| WorkerStatusView {
                packet_id: w.packet_id,
                packet_name: w.packet_name,
                status: w.status.to_string(),
                tasks_completed: w.tasks_completed,
                tasks_total: w.tasks_total,
            })
            .collect(),
        created_at: view.swarm.created_at,
        updated_at: view.swarm.updated_at,
        completed_at: view.swarm.completed_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since_event_id: Option<i64>,
}

async fn events(
    State(state): State<SharedState>,
    Path(swarm_id): Path<String>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>, ApiError> {
    require_swarm(&state, &swarm_id)?;

    let cursor = super::sse::resolve_cursor(&headers, query.since_event_id);
    let stream = super::sse::event_stream(state.store.clone(), swarm_id, cursor, state.sse_poll_interval);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        Arc::new(AppState {
            store: Arc::new(StateManager::open_in_memory().unwrap()),
            retry_policy: RetryPolicy::default(),
            sse_poll_interval: Duration::from_millis(10),
            started_at: Instant::now(),
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(test_state());
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn create_then_register_then_status_round_trip() {
        let app = router(test_state());

        let create_req = axum::http::Request::builder()
            .method("POST")
            .uri("/swarm/create")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                serde_json::json!({"feature": "auth", "manifest_path": "m.yaml"}).to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(create_req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::CREATED);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let swarm_id = created["swarm_id"].as_str().unwrap().to_string();

        let register_req = axum::http::Request::builder()
            .method("POST")
            .uri(format!("/swarm/{swarm_id}/register"))
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                serde_json::json!({"packet_id": 1, "packet_name": "core-api", "tasks_total": 3, "worktree": "/tmp/w"})
                    .to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(register_req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let status_req = axum::http::Request::builder()
            .uri(format!("/swarm/{swarm_id}/status"))
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = app.oneshot(status_req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let status: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status["workers_registered"], 1);
        assert_eq!(status["status"], "running");
    }

    #[tokio::test]
    async fn status_for_unknown_swarm_is_404() {
        let app = router(test_state());
        let req = axum::http::Request::builder()
            .uri("/swarm/swarm-missing/status")
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_rejects_invalid_body_with_422() {
        let app = router(test_state());

        let create_req = axum::http::Request::builder()
            .method("POST")
            .uri("/swarm/create")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                serde_json::json!({"feature": "auth", "manifest_path": "m.yaml"}).to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(create_req).await.unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let swarm_id = created["swarm_id"].as_str().unwrap().to_string();

        let register_req = axum::http::Request::builder()
            .method("POST")
            .uri(format!("/swarm/{swarm_id}/register"))
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                serde_json::json!({"packet_id": 0, "packet_name": "Bad Name", "tasks_total": 0, "worktree": ""})
                    .to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(register_req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
