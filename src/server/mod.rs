//! The coordination HTTP server: router assembly, startup, and graceful shutdown.

mod routes;
mod sse;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::errors::StartupError;
use crate::retry::RetryPolicy;
use crate::state::StateManager;

pub use routes::AppState;

/// Build the full router, wired to `state` and wrapped with request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}

/// Opens the store, builds the router, binds the configured address, and serves until
/// a ctrl-c signal arrives.
pub async fn start_server(config: &Config) -> Result<(), StartupError> {
    let db_path = config.database_path();
    let store = StateManager::open(&db_path).map_err(|source| StartupError::Database {
        path: db_path,
        source,
    })?;

    let state = Arc::new(AppState {
        store: Arc::new(store),
        retry_policy: RetryPolicy::from_config(&config.toml.retry),
        sse_poll_interval: Duration::from_secs(config.toml.sse.poll_interval_secs.max(1)),
        started_at: Instant::now(),
    });

    let app = build_router(state);
    let addr = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let local_addr = listener.local_addr().map_err(|source| StartupError::Bind {
        addr: addr.clone(),
        source,
    })?;
    tracing::info!(addr = %local_addr, "coordination server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
        .map_err(StartupError::Serve)?;

    tracing::info!("coordination server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let state = Arc::new(AppState {
            store: Arc::new(StateManager::open_in_memory().unwrap()),
            retry_policy: RetryPolicy::default(),
            sse_poll_interval: Duration::from_millis(10),
            started_at: Instant::now(),
        });
        build_router(state)
    }

    #[tokio::test]
    async fn health_is_reachable_through_the_full_router() {
        let app = test_router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = test_router();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
