//! Polling-based Server-Sent Events for the swarm event log.
//!
//! The store has no pub/sub; the stream wakes on a fixed interval, asks for
//! events newer than its cursor, and stops once the swarm has reached a
//! terminal status and no events remain to flush.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::response::sse::Event as SseEvent;
use futures_util::stream::{self, Stream};

use crate::state::StateManager;
use crate::state::models::SwarmStatus;

/// `Last-Event-ID` takes precedence over a `since_event_id` query parameter only when the
/// header is absent; reconnecting clients are expected to send the header.
pub fn resolve_cursor(headers: &HeaderMap, since_event_id: Option<i64>) -> i64 {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or(since_event_id)
        .unwrap_or(0)
}

struct CursorState {
    store: Arc<StateManager>,
    swarm_id: String,
    cursor: i64,
    poll_interval: Duration,
    pending: VecDeque<SseEvent>,
    done: bool,
}

fn to_sse(event: &crate::state::models::Event) -> SseEvent {
    SseEvent::default()
        .id(event.event_id.to_string())
        .event(event.event_type.to_string())
        .data(serde_json::to_string(event).unwrap_or_default())
}

/// Builds the event stream for one `GET /swarm/{id}/events` connection.
pub fn event_stream(
    store: Arc<StateManager>,
    swarm_id: String,
    cursor: i64,
    poll_interval: Duration,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    let state = CursorState {
        store,
        swarm_id,
        cursor,
        poll_interval,
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }

            let events = match state.store.get_events(&state.swarm_id, state.cursor) {
                Ok(events) => events,
                Err(err) => {
                    tracing::error!(swarm_id = %state.swarm_id, error = %err, "event stream query failed");
                    state.done = true;
                    let err_event = SseEvent::default()
                        .event("error")
                        .data("{\"error\":\"store_error\"}");
                    return Some((Ok(err_event), state));
                }
            };

            if let Some(last) = events.last() {
                state.cursor = last.event_id;
                state.pending.extend(events.iter().map(to_sse));
                continue;
            }

            let terminal = state
                .store
                .get_swarm(&state.swarm_id)
                .ok()
                .flatten()
                .map(|s| matches!(s.status, SwarmStatus::Complete | SwarmStatus::Failed))
                .unwrap_or(true);

            if terminal {
                return None;
            }

            tokio::time::sleep(state.poll_interval).await;
        }
    })
}
