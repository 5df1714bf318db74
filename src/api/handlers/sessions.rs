//! Management API for capture sessions.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::AppState;
use crate::api::models::sessions::{SessionCreateRequest, SessionResponse};
use crate::errors::{Error, Result};

/// Create a capture session and hand back its link.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionCreateRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let session = state.sessions.create(request.camera, request.valid_for);
    let capture_url = state.config.capture_url(session.token);

    Ok((StatusCode::CREATED, Json(SessionResponse::from_session(&session, capture_url))))
}

/// List live sessions, most recently created first.
pub async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<SessionResponse>>> {
    let sessions = state
        .sessions
        .live_sessions()
        .iter()
        .map(|session| SessionResponse::from_session(session, state.config.capture_url(session.token)))
        .collect();

    Ok(Json(sessions))
}

/// Revoke a session so its link stops working immediately.
pub async fn revoke_session(State(state): State<AppState>, Path(token): Path<String>) -> Result<StatusCode> {
    let not_found = || Error::NotFound {
        resource: "Capture session".to_string(),
        id: token.clone(),
    };

    let token_id: Uuid = token.parse().map_err(|_| not_found())?;
    state.sessions.revoke(token_id).ok_or_else(not_found)?;

    Ok(StatusCode::NO_CONTENT)
}
