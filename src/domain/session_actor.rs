//! Per-session actor owning one [`Counter`].
//!
//! The actor is the only writer of its counter. Client connections are
//! handed to it through a [`SessionHandle`]; for each one it builds a
//! [`SessionLink`] (catch-up, update receiver, request sender) and runs
//! the connection future inside its own `JoinSet`.
//!
//! Once every client has gone and no new one attaches within the idle
//! timeout, the actor stops and reports a [`SessionExit`].

use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::counter::{Counter, Request, Response, SessionState};
use super::session_id::SessionId;
use super::update_bus::UpdateBus;
use crate::config::SessionSettings;

/// Grace period for client tasks to close their sockets on shutdown.
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a client connection needs to talk to its session.
#[derive(Debug)]
pub struct SessionLink {
    /// Session the link belongs to.
    pub session_id: SessionId,
    /// Responses describing the state at attach time; send these first.
    pub catch_up: Vec<Response>,
    /// Updates published after the catch-up was taken.
    pub updates: broadcast::Receiver<Response>,
    /// Channel into the actor for client requests.
    pub requests: mpsc::Sender<Request>,
    /// Cancelled when the session shuts down or the connection ends.
    pub cancel: CancellationToken,
}

/// A client connection waiting to be driven by a session actor.
pub type Connection = Box<dyn FnOnce(SessionLink) -> BoxFuture<'static, ()> + Send>;

/// Final report of a stopped actor.
pub struct SessionExit {
    /// Counter value at shutdown.
    pub state: Counter,
    /// Connections queued after the actor decided to stop.
    pub pending: Vec<Connection>,
}

impl fmt::Debug for SessionExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionExit")
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Cloneable handle used to attach connections to a running actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    actor_id: Uuid,
    connections: mpsc::Sender<Connection>,
    finished: watch::Receiver<bool>,
}

impl SessionHandle {
    /// Returns `true` once the actor no longer accepts connections.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.connections.is_closed()
    }

    /// Hands a connection to the actor.
    ///
    /// # Errors
    ///
    /// Gives the connection back if the actor has stopped accepting.
    pub async fn attach(&self, connection: Connection) -> Result<(), Connection> {
        self.connections.send(connection).await.map_err(|err| err.0)
    }

    /// Waits until the stopped session has been saved and deregistered.
    pub async fn finished(&self) {
        let mut rx = self.finished.clone();
        // A dropped sender means the finalizer is gone; nothing left to wait for.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Unique id of the actor behind this handle.
    #[must_use]
    pub const fn actor_id(&self) -> Uuid {
        self.actor_id
    }
}

/// A freshly spawned actor together with its shutdown plumbing.
#[derive(Debug)]
pub struct SpawnedSession {
    /// Handle for attaching connections.
    pub handle: SessionHandle,
    /// Resolves with the final state when the actor stops.
    pub exit: oneshot::Receiver<SessionExit>,
    /// Set to `true` by whoever finalizes the stopped session.
    pub finished: watch::Sender<bool>,
}

/// Actor state. Constructed and driven by [`SessionActor::spawn`].
struct SessionActor {
    session_id: SessionId,
    state: Counter,
    bus: UpdateBus,
    request_tx: mpsc::Sender<Request>,
    request_rx: mpsc::Receiver<Request>,
    connections: mpsc::Receiver<Connection>,
    tasks: JoinSet<()>,
    shutdown: CancellationToken,
    settings: SessionSettings,
}

impl SessionActor {
    fn spawn(
        session_id: SessionId,
        state: Counter,
        settings: SessionSettings,
    ) -> SpawnedSession {
        let (conn_tx, conn_rx) = mpsc::channel(settings.request_channel_capacity.max(1));
        let (request_tx, request_rx) = mpsc::channel(settings.request_channel_capacity.max(1));
        let (exit_tx, exit_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = watch::channel(false);

        let actor = Self {
            session_id,
            state,
            bus: UpdateBus::new(settings.update_bus_capacity),
            request_tx,
            request_rx,
            connections: conn_rx,
            tasks: JoinSet::new(),
            shutdown: CancellationToken::new(),
            settings,
        };
        tokio::spawn(async move {
            let exit = actor.run().await;
            let _ = exit_tx.send(exit);
        });

        SpawnedSession {
            handle: SessionHandle {
                actor_id: Uuid::new_v4(),
                connections: conn_tx,
                finished: finished_rx,
            },
            exit: exit_rx,
            finished: finished_tx,
        }
    }

    async fn run(mut self) -> SessionExit {
        tracing::info!(session_id = %self.session_id, value = self.state.value, "session started");
        // No client yet counts as idle, so an upgrade that never completes
        // cannot pin the actor.
        let mut exiting = true;

        loop {
            let idle = sleep(self.settings.idle_timeout);
            tokio::select! {
                Some(request) = self.request_rx.recv() => self.handle_request(request),
                connection = self.connections.recv() => {
                    let Some(connection) = connection else {
                        // Every handle is gone: the registry is shutting down.
                        break;
                    };
                    self.handle_connection(connection);
                    exiting = false;
                }
                joined = self.tasks.join_next(), if !exiting => match joined {
                    None => exiting = true,
                    Some(Err(err)) => {
                        tracing::warn!(session_id = %self.session_id, error = %err, "client task failed");
                    }
                    Some(Ok(())) => {}
                },
                () = idle, if exiting => break,
            }
        }

        self.connections.close();
        let mut pending = Vec::new();
        while let Ok(connection) = self.connections.try_recv() {
            pending.push(connection);
        }
        while let Ok(request) = self.request_rx.try_recv() {
            self.handle_request(request);
        }

        self.shutdown.cancel();
        let drained = tokio::time::timeout(CLIENT_DRAIN_TIMEOUT, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            self.tasks.shutdown().await;
        }

        tracing::info!(
            session_id = %self.session_id,
            value = self.state.value,
            pending = pending.len(),
            "session stopped"
        );
        SessionExit {
            state: self.state,
            pending,
        }
    }

    fn handle_request(&mut self, request: Request) {
        let responses = self.state.update(request);
        for response in responses {
            let receivers = self.bus.publish(response);
            tracing::debug!(
                session_id = %self.session_id,
                ?request,
                ?response,
                receivers,
                "request applied"
            );
        }
    }

    fn handle_connection(&mut self, connection: Connection) {
        // Subscribe before dumping so no update falls between the two.
        let updates = self.bus.subscribe();
        let link = SessionLink {
            session_id: self.session_id.clone(),
            catch_up: self.state.dump(),
            updates,
            requests: self.request_tx.clone(),
            cancel: self.shutdown.child_token(),
        };
        self.tasks.spawn(connection(link));
        tracing::debug!(
            session_id = %self.session_id,
            clients = self.bus.receiver_count(),
            "client attached"
        );
    }
}

/// Starts a session actor. See [`SpawnedSession`] for the returned parts.
#[must_use]
pub fn spawn_session(
    session_id: SessionId,
    state: Counter,
    settings: SessionSettings,
) -> SpawnedSession {
    SessionActor::spawn(session_id, state, settings)
}
