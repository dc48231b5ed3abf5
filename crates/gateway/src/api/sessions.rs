//! Session management endpoints.
//!
//! - `POST /api/sessions`      — create
//! - `GET  /api/sessions`      — list own sessions
//! - `GET  /api/sessions/:id`  — fetch one (owner or peer)

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use mgx_domain::{Framework, Session};
use mgx_store::SessionStore as _;

use crate::api::api_error;
use crate::auth::Identity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub framework: Framework,
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateSessionRequest>,
) -> Response {
    let subject = match &identity {
        Identity::User { subject } => subject.clone(),
        Identity::Peer { .. } => {
            return api_error(StatusCode::FORBIDDEN, "peers cannot create sessions")
        }
    };
    if body.name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "name must not be empty");
    }

    let session = Session::new(body.name.trim(), body.framework, subject);

    // The workspace directory backs the container bind mount; create it
    // eagerly so a worker on another host never races an empty mount.
    let workspace_path = state.config.workspace.path_for(&session.workspace_id);
    if let Err(e) = std::fs::create_dir_all(&workspace_path) {
        tracing::error!(error = %e, path = %workspace_path.display(), "workspace creation failed");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "workspace creation failed");
    }

    if let Err(e) = state.store.create_session(session.clone()).await {
        tracing::error!(error = %e, "session persist failed");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "session persist failed");
    }

    tracing::info!(session_id = %session.id, name = %session.name, "session created");
    (StatusCode::CREATED, Json(session)).into_response()
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let subject = match &identity {
        Identity::User { subject } => subject.clone(),
        Identity::Peer { .. } => {
            return api_error(StatusCode::FORBIDDEN, "peers cannot list sessions")
        }
    };
    match state.store.list_sessions(Some(&subject)).await {
        Ok(sessions) => Json(serde_json::json!({
            "sessions": sessions,
            "count": sessions.len(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "session list failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "session list failed")
        }
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Response {
    match crate::api::agent::load_authorized_session(&state, &identity, &id).await {
        Ok(session) => Json(session).into_response(),
        Err(resp) => resp,
    }
}
