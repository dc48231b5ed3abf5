//! Agent execution endpoints.
//!
//! - `POST /api/apps/:sid/agent/generate`        — start a run, stream SSE
//! - `GET  /api/apps/:sid/agent/stream-continue` — resume the event stream
//! - `POST /api/apps/:sid/agent/stop`            — request termination
//! - `GET  /api/apps/:sid/agent/history`         — message history

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_core::Stream;
use serde::Deserialize;

use mgx_domain::{epoch_now, Session, StoredMessage};
use mgx_store::{ControlStore as _, MessageStore as _, SessionStore as _, TaskQueue as _};

use crate::api::api_error;
use crate::auth::Identity;
use crate::sse::event_stream;
use crate::state::AppState;

/// Load a session and enforce access. Errors come back as ready-made
/// responses (404 unknown, 403 cross-user).
pub(crate) async fn load_authorized_session(
    state: &AppState,
    identity: &Identity,
    session_id: &str,
) -> Result<Session, Response> {
    let session = match state.store.get_session(session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return Err(api_error(StatusCode::NOT_FOUND, "unknown session")),
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "session lookup failed",
            ));
        }
    };
    if !identity.may_access(&session) {
        return Err(api_error(StatusCode::FORBIDDEN, "not your session"));
    }
    Ok(session)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/apps/:sid/agent/generate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

pub async fn generate(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(sid): Path<String>,
    Json(body): Json<GenerateRequest>,
) -> Response {
    let session = match load_authorized_session(&state, &identity, &sid).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    if body.prompt.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "prompt must not be empty");
    }
    if session.is_running {
        return api_error(StatusCode::CONFLICT, "a run is already in progress");
    }

    // One live generate stream per session per gateway.
    let permit = match state.session_locks.try_acquire(&sid) {
        Ok(permit) => permit,
        Err(busy) => return api_error(StatusCode::CONFLICT, busy.to_string()),
    };

    // The prompt is recorded durably *before* the task is enqueued — the
    // container rediscovers it from the store, the queue payload carries
    // only the session id.
    let message = StoredMessage::user(session.id.clone(), body.prompt.trim(), epoch_now());
    let watermark = message.ts;
    if let Err(e) = state.store.append_message(message).await {
        tracing::error!(error = %e, "user message persist failed");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "message persist failed");
    }
    if let Err(e) = state.store.enqueue_task(&session.id).await {
        tracing::error!(error = %e, "task enqueue failed");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "task enqueue failed");
    }
    tracing::info!(session_id = %session.id, "run enqueued");

    // Stream events from just before the user turn so the client sees the
    // run from its beginning.
    let stream = hold_permit(
        event_stream(
            state.store.clone(),
            session.id.clone(),
            Some(watermark),
            state.config.server.sse.clone(),
        ),
        permit,
    );
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// Tie the generate permit to the stream's lifetime: it releases when the
/// SSE connection closes.
fn hold_permit<S, T>(
    stream: S,
    permit: tokio::sync::OwnedSemaphorePermit,
) -> impl Stream<Item = T>
where
    S: Stream<Item = T>,
{
    async_stream::stream! {
        let _permit = permit;
        for await item in stream {
            yield item;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/apps/:sid/agent/stream-continue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct StreamContinueQuery {
    /// Resume watermark; omitted means replay from the beginning.
    pub since_timestamp: Option<f64>,
}

pub async fn stream_continue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(sid): Path<String>,
    Query(query): Query<StreamContinueQuery>,
) -> Response {
    let session = match load_authorized_session(&state, &identity, &sid).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    let stream = event_stream(
        state.store.clone(),
        session.id,
        query.since_timestamp,
        state.config.server.sse.clone(),
    );
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/apps/:sid/agent/stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stop(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(sid): Path<String>,
) -> Response {
    let session = match load_authorized_session(&state, &identity, &sid).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    if let Err(e) = state.store.request_stop(&session.id).await {
        tracing::error!(error = %e, "stop persist failed");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "stop persist failed");
    }
    tracing::info!(session_id = %session.id, "stop requested");
    Json(serde_json::json!({ "success": true })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/apps/:sid/agent/history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    100
}

pub async fn history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(sid): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let session = match load_authorized_session(&state, &identity, &sid).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    match state.store.list_messages(&session.id, query.limit).await {
        Ok(messages) => Json(serde_json::json!({
            "messages": messages,
            "count": messages.len(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "history fetch failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "history fetch failed")
        }
    }
}
