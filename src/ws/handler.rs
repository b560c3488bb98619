//! Axum WebSocket upgrade handler.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::FutureExt;
use serde::Deserialize;
use uuid::Uuid;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::{Connection, SessionId, SessionLink, SessionRegistry};
use crate::error::GatewayError;

/// Query parameters of the socket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Session to join. Named `uuid` on the wire, though any id works.
    pub uuid: Option<String>,
}

/// `GET /api/ws?uuid=<id>` — Upgrade HTTP connection to a session socket.
///
/// The session is started (and its saved counter loaded) before the
/// upgrade so that failures surface as HTTP errors.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidSessionId`] (404) when `uuid` is
/// missing or invalid, or the registry's error if the session cannot be
/// started.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let raw = params.uuid.ok_or_else(|| {
        GatewayError::InvalidSessionId("missing `uuid` query parameter".to_string())
    })?;
    let session_id = SessionId::parse(&raw)?;
    state.sessions.live_handle(&session_id).await?;

    let registry = Arc::clone(&state.sessions);
    let inactivity = registry.settings().client_inactivity_timeout;
    Ok(ws.on_upgrade(move |socket| accept(registry, session_id, socket, inactivity)))
}

/// Probes the fresh socket, then hands it to its session.
async fn accept(
    registry: Arc<SessionRegistry>,
    session_id: SessionId,
    mut socket: WebSocket,
    inactivity: Duration,
) {
    let connection_id = Uuid::new_v4();
    // Kick things off with a ping; a socket that cannot take one is dead.
    if socket
        .send(Message::Ping(Bytes::from_static(&[1, 2, 3])))
        .await
        .is_err()
    {
        tracing::debug!(%session_id, %connection_id, "ws closed before attach");
        return;
    }

    tracing::info!(%session_id, %connection_id, "ws client connected");
    let connection: Connection = Box::new(move |link: SessionLink| {
        run_connection(socket, link, inactivity, connection_id).boxed()
    });
    if let Err(err) = registry.attach(session_id.clone(), connection).await {
        tracing::warn!(%session_id, %connection_id, error = %err, "ws client could not attach");
    }
}
