//! HTTP request handlers.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::session::SessionSnapshot;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// GET /healthz
pub async fn health() -> &'static str {
    "ok"
}

/// GET /sessions/{session_id}
///
/// Session state for reconnecting clients: status, timestamps, and publish
/// accounting.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    state
        .coordinator
        .snapshot(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("session not found: {}", session_id)))
}
