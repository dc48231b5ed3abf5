pub mod agent;
pub mod sessions;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Build the full API router.
///
/// `/api/health` is public; everything else sits behind the identity
/// middleware.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/api/health", get(health));

    let protected = Router::new()
        // Sessions
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/sessions/:id", get(sessions::get_session))
        // Agent execution
        .route("/api/apps/:sid/agent/generate", post(agent::generate))
        .route(
            "/api/apps/:sid/agent/stream-continue",
            get(agent::stream_continue),
        )
        .route("/api/apps/:sid/agent/stop", post(agent::stop))
        .route("/api/apps/:sid/agent/history", get(agent::history))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::auth::require_identity,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
