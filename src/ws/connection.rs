//! WebSocket connection loop for one attached client.
//!
//! Sends the session catch-up, then forwards client requests to the
//! session actor and session updates back to the client until either
//! side goes away.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use crate::domain::{Request, Response, SessionId, SessionLink};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Text frames from the client are decoded as [`Request`]s and handed
///   to the session. Malformed frames are logged and ignored.
/// - Every [`Response`] published by the session is sent as a JSON text
///   frame.
/// - The loop ends on close, send failure, cancellation, or after
///   `inactivity` without any inbound frame.
pub async fn run_connection(
    socket: WebSocket,
    link: SessionLink,
    inactivity: Duration,
    connection_id: Uuid,
) {
    let SessionLink {
        session_id,
        catch_up,
        mut updates,
        requests,
        cancel,
    } = link;
    let (mut ws_tx, mut ws_rx) = socket.split();

    for response in catch_up {
        if ws_tx.send(encode(&response)).await.is_err() {
            cancel.cancel();
            return;
        }
    }

    let idle = sleep(inactivity);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            // Incoming frame from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        idle.as_mut().reset(Instant::now() + inactivity);
                        match serde_json::from_str::<Request>(text.as_str()) {
                            Ok(request) => {
                                if requests.send(request).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(
                                    %session_id,
                                    %connection_id,
                                    error = %err,
                                    "ignoring malformed client request"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => idle.as_mut().reset(Instant::now() + inactivity),
                    Some(Err(err)) => {
                        tracing::debug!(%session_id, %connection_id, error = %err, "ws read failed");
                        break;
                    }
                }
            }
            // Update from the session
            update = next_update(&mut updates, &session_id, connection_id) => {
                let Some(response) = update else {
                    break;
                };
                if ws_tx.send(encode(&response)).await.is_err() {
                    break;
                }
            }
            () = &mut idle => {
                tracing::debug!(%session_id, %connection_id, "closing inactive ws connection");
                break;
            }
            () = cancel.cancelled() => break,
        }
    }

    cancel.cancel();
    let _ = ws_tx.close().await;
    tracing::debug!(%session_id, %connection_id, "ws connection closed");
}

/// Receives the next session update, skipping over any the client lagged
/// behind on. Returns `None` once the session is gone.
async fn next_update(
    updates: &mut broadcast::Receiver<Response>,
    session_id: &SessionId,
    connection_id: Uuid,
) -> Option<Response> {
    loop {
        match updates.recv().await {
            Ok(response) => return Some(response),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(%session_id, %connection_id, lagged = n, "ws client lagged behind session updates");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Serializes a session update into a text frame.
fn encode(response: &Response) -> Message {
    Message::text(serde_json::to_string(response).unwrap_or_default())
}
