//! Saved session endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::persistence::StoredSession;

/// `GET /api/sessions` — Saved counters, ordered by session id.
///
/// Sessions are saved when their actor stops, so a live session shows
/// its value as of its previous shutdown. Empty when persistence is
/// disabled.
///
/// # Errors
///
/// Returns [`GatewayError::Persistence`] if the database query fails.
#[utoipa::path(
    get,
    path = "/api/sessions",
    tag = "Sessions",
    summary = "List saved sessions",
    responses(
        (status = 200, description = "Saved sessions", body = Vec<StoredSession>),
        (status = 500, description = "Database failure"),
    )
)]
pub async fn list_sessions_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredSession>>, GatewayError> {
    let sessions = match state.sessions.persistence() {
        Some(persistence) => persistence.list_sessions().await?,
        None => Vec::new(),
    };
    Ok(Json(sessions))
}

/// Session routes, nested under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sessions", get(list_sessions_handler))
}
