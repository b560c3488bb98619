//! Live session lookup and lifecycle.
//!
//! [`SessionRegistry`] maps every active [`SessionId`] to the handle of
//! its actor. The first connection for an id starts the actor (loading
//! the saved counter when persistence is enabled); when the actor stops
//! its final counter is saved and the entry removed.
//!
//! # Concurrency
//!
//! - Lookups of live sessions only take the read lock.
//! - Starting a session is serialized under the write lock and
//!   double-checked, so concurrent first connections share one actor.
//!   The lock is held while the saved counter is loaded, so first
//!   connections to different ids also wait on each other's database
//!   read. Attaching to an already live session never does.
//! - Lock order is `sessions` then `finalizers`. [`SessionRegistry::shutdown`]
//!   sets its closing flag under the `sessions` write lock, so every
//!   session it does not drain was refused, and every session it drains
//!   already has its finalizer registered.
//! - A connection that races a stopping actor waits until that actor's
//!   state is saved before a successor loads it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::counter::Counter;
use super::session_actor::{
    Connection, SessionExit, SessionHandle, SpawnedSession, spawn_session,
};
use super::session_id::SessionId;
use crate::config::SessionSettings;
use crate::error::GatewayError;
use crate::persistence::SqlitePersistence;

/// How many times a connection chases a stopping actor before giving up.
const ATTACH_ATTEMPTS: usize = 3;

/// Central store for all active sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    persistence: Option<SqlitePersistence>,
    settings: SessionSettings,
    finalizers: Mutex<JoinSet<()>>,
    requeue: mpsc::UnboundedSender<(SessionId, Connection)>,
    closing: AtomicBool,
}

impl SessionRegistry {
    /// Creates an empty registry and its requeue worker.
    ///
    /// With `persistence` set, counters survive their actors. Must be
    /// called from within a Tokio runtime.
    #[must_use]
    pub fn start(persistence: Option<SqlitePersistence>, settings: SessionSettings) -> Arc<Self> {
        let (requeue, mut requeue_rx) = mpsc::unbounded_channel::<(SessionId, Connection)>();
        let registry = Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            persistence,
            settings,
            finalizers: Mutex::new(JoinSet::new()),
            requeue,
            closing: AtomicBool::new(false),
        });

        // Connections that reached an actor after it decided to stop are
        // re-attached here, once their session has been saved.
        let worker = Arc::downgrade(&registry);
        tokio::spawn(async move {
            while let Some((id, connection)) = requeue_rx.recv().await {
                let Some(registry) = worker.upgrade() else {
                    break;
                };
                if let Err(err) = registry.attach(id.clone(), connection).await {
                    tracing::warn!(session_id = %id, error = %err, "dropped connection queued on stopped session");
                }
            }
        });

        registry
    }

    /// Returns the session tuning shared by every actor.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Returns the persistence layer, if enabled.
    #[must_use]
    pub const fn persistence(&self) -> Option<&SqlitePersistence> {
        self.persistence.as_ref()
    }

    /// Returns the handle of the live actor for `id`, starting one if
    /// necessary.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionUnavailable`] while the registry is
    /// shutting down, or [`GatewayError::Persistence`] if the saved
    /// counter cannot be loaded.
    pub async fn live_handle(
        self: &Arc<Self>,
        id: &SessionId,
    ) -> Result<SessionHandle, GatewayError> {
        loop {
            self.ensure_open(id)?;

            let stopping = {
                let map = self.sessions.read().await;
                match map.get(id) {
                    Some(handle) if !handle.is_closed() => return Ok(handle.clone()),
                    Some(handle) => Some(handle.clone()),
                    None => None,
                }
            };
            if let Some(handle) = stopping {
                handle.finished().await;
                continue;
            }

            let mut map = self.sessions.write().await;
            // Shutdown flips `closing` under this lock; re-check so no
            // session slips in after the map was drained.
            self.ensure_open(id)?;
            match map.get(id) {
                Some(handle) if !handle.is_closed() => return Ok(handle.clone()),
                Some(handle) => {
                    let handle = handle.clone();
                    drop(map);
                    handle.finished().await;
                    continue;
                }
                None => {}
            }

            let state = self.load_state(id).await?;
            let spawned = spawn_session(id.clone(), state, self.settings);
            let handle = spawned.handle.clone();
            map.insert(id.clone(), handle.clone());
            // Registered before the lock is released, so a concurrent
            // shutdown always waits for this session's save.
            self.spawn_finalizer(id.clone(), spawned).await;
            drop(map);
            return Ok(handle);
        }
    }

    /// Attaches a client connection to the session `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionUnavailable`] if the registry is
    /// shutting down or the session keeps stopping underneath the
    /// connection, or [`GatewayError::Persistence`] if a new actor cannot
    /// load its state.
    pub async fn attach(
        self: &Arc<Self>,
        id: SessionId,
        mut connection: Connection,
    ) -> Result<(), GatewayError> {
        for _ in 0..ATTACH_ATTEMPTS {
            let handle = self.live_handle(&id).await?;
            match handle.attach(connection).await {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    connection = returned;
                    handle.finished().await;
                }
            }
        }
        Err(GatewayError::SessionUnavailable(format!(
            "session {id} stopped during attach"
        )))
    }

    /// Returns the number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Returns the identifiers of all live sessions, sorted.
    pub async fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stops every session and waits until their counters are saved.
    ///
    /// New connections are refused from this point on.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = {
            let mut map = self.sessions.write().await;
            self.closing.store(true, Ordering::SeqCst);
            map.drain().map(|(_, handle)| handle).collect()
        };
        tracing::info!(sessions = handles.len(), "stopping sessions");
        // Dropping the last handle closes each actor's connection channel.
        drop(handles);

        let mut finalizers = std::mem::take(&mut *self.finalizers.lock().await);
        while let Some(joined) = finalizers.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "session finalizer failed");
            }
        }
    }

    fn ensure_open(&self, id: &SessionId) -> Result<(), GatewayError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(GatewayError::SessionUnavailable(format!(
                "gateway is shutting down; session {id} not started"
            )));
        }
        Ok(())
    }

    async fn load_state(&self, id: &SessionId) -> Result<Counter, GatewayError> {
        match &self.persistence {
            Some(persistence) => Ok(persistence.load_session(id).await?.unwrap_or_default()),
            None => Ok(Counter::default()),
        }
    }

    async fn spawn_finalizer(self: &Arc<Self>, id: SessionId, spawned: SpawnedSession) {
        let SpawnedSession {
            handle,
            exit,
            finished,
        } = spawned;
        let actor_id = handle.actor_id();
        // The finalizer must not keep a handle alive, or shutdown never
        // closes the actor's connection channel.
        drop(handle);

        let registry = Arc::clone(self);
        let mut finalizers = self.finalizers.lock().await;
        while finalizers.try_join_next().is_some() {}
        finalizers.spawn(async move {
            let pending = registry.save_exit(&id, exit.await).await;
            registry.deregister(&id, actor_id).await;
            finished.send_replace(true);
            for connection in pending {
                // Only fails once the registry itself is gone.
                let _ = registry.requeue.send((id.clone(), connection));
            }
        });
    }

    async fn save_exit(
        &self,
        id: &SessionId,
        exit: Result<SessionExit, oneshot::error::RecvError>,
    ) -> Vec<Connection> {
        let Ok(exit) = exit else {
            tracing::error!(session_id = %id, "session actor ended without reporting state");
            return Vec::new();
        };
        if let Some(persistence) = &self.persistence
            && let Err(err) = persistence.save_session(id, &exit.state).await
        {
            tracing::error!(session_id = %id, error = %err, "failed to save session");
        }
        exit.pending
    }

    async fn deregister(&self, id: &SessionId, actor_id: Uuid) {
        let mut map = self.sessions.write().await;
        if map.get(id).is_some_and(|current| current.actor_id() == actor_id) {
            map.remove(id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use futures_util::FutureExt;

    use super::*;
    use crate::domain::{Request, Response, SessionLink};

    fn settings() -> SessionSettings {
        SessionSettings {
            idle_timeout: Duration::from_millis(20),
            ..SessionSettings::default()
        }
    }

    fn id(raw: &str) -> SessionId {
        let Ok(id) = SessionId::parse(raw) else {
            panic!("valid id");
        };
        id
    }

    fn holding() -> (Connection, oneshot::Receiver<SessionLink>, oneshot::Sender<()>) {
        let (link_tx, link_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let connection: Connection = Box::new(move |link: SessionLink| {
            async move {
                let cancel = link.cancel.clone();
                let _ = link_tx.send(link);
                tokio::select! {
                    _ = release_rx => {}
                    () = cancel.cancelled() => {}
                }
            }
            .boxed()
        });
        (connection, link_rx, release_tx)
    }

    fn scripted(requests: Vec<Request>) -> Connection {
        Box::new(move |link: SessionLink| {
            async move {
                for request in requests {
                    let _ = link.requests.send(request).await;
                }
            }
            .boxed()
        })
    }

    async fn wait_until_empty(registry: &SessionRegistry) {
        for _ in 0..200 {
            if registry.is_empty().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sessions did not stop");
    }

    #[tokio::test]
    async fn same_id_shares_one_actor() {
        let registry = SessionRegistry::start(None, settings());
        let (conn_a, link_a, _release_a) = holding();
        let (conn_b, link_b, _release_b) = holding();

        assert!(registry.attach(id("room"), conn_a).await.is_ok());
        let Ok(a) = link_a.await else {
            panic!("link a");
        };
        assert!(a.requests.send(Request::Increment).await.is_ok());

        assert!(registry.attach(id("room"), conn_b).await.is_ok());
        let Ok(mut b) = link_b.await else {
            panic!("link b");
        };
        // Either the increment is already in the catch-up or it follows on the bus.
        let seen = if b.catch_up == vec![Response::Counter(1)] {
            Response::Counter(1)
        } else {
            let Ok(update) = b.updates.recv().await else {
                panic!("update expected");
            };
            update
        };
        assert_eq!(seen, Response::Counter(1));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn different_ids_get_separate_actors() {
        let registry = SessionRegistry::start(None, settings());
        let (conn_a, _link_a, _release_a) = holding();
        let (conn_b, _link_b, _release_b) = holding();
        assert!(registry.attach(id("a"), conn_a).await.is_ok());
        assert!(registry.attach(id("b"), conn_b).await.is_ok());

        let ids = registry.ids().await;
        assert_eq!(ids, vec![id("a"), id("b")]);
    }

    #[tokio::test]
    async fn idle_session_is_saved_and_restored() {
        let Ok(db) = SqlitePersistence::in_memory().await else {
            panic!("in-memory database");
        };
        let registry = SessionRegistry::start(Some(db.clone()), settings());

        let conn = scripted(vec![Request::Increment, Request::Increment]);
        assert!(registry.attach(id("saved"), conn).await.is_ok());
        wait_until_empty(&registry).await;

        let loaded = db.load_session(&id("saved")).await;
        assert!(matches!(loaded, Ok(Some(Counter { value: 2 }))));

        let (conn, link_rx, _release) = holding();
        assert!(registry.attach(id("saved"), conn).await.is_ok());
        let Ok(link) = link_rx.await else {
            panic!("link expected");
        };
        assert_eq!(link.catch_up, vec![Response::Counter(2)]);
    }

    #[tokio::test]
    async fn without_persistence_state_resets_after_idle() {
        let registry = SessionRegistry::start(None, settings());
        assert!(
            registry
                .attach(id("volatile"), scripted(vec![Request::Increment]))
                .await
                .is_ok()
        );
        wait_until_empty(&registry).await;

        let (conn, link_rx, _release) = holding();
        assert!(registry.attach(id("volatile"), conn).await.is_ok());
        let Ok(link) = link_rx.await else {
            panic!("link expected");
        };
        assert_eq!(link.catch_up, vec![Response::Counter(0)]);
    }

    #[tokio::test]
    async fn concurrent_first_connections_share_one_actor() {
        let registry = SessionRegistry::start(None, SessionSettings::default());
        let starts: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.live_handle(&id("crowd")).await })
            })
            .collect();

        let mut actors = Vec::new();
        for start in starts {
            let Ok(Ok(handle)) = start.await else {
                panic!("start failed");
            };
            actors.push(handle.actor_id());
        }
        actors.dedup();
        assert_eq!(actors.len(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn shutdown_waits_for_session_started_while_it_queued() {
        let Ok(db) = SqlitePersistence::in_memory().await else {
            panic!("in-memory database");
        };
        let registry = SessionRegistry::start(Some(db.clone()), settings());

        // Hold the map so the start and the shutdown queue up behind it.
        let guard = registry.sessions.write().await;
        let late = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.live_handle(&id("late")).await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stopping = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.shutdown().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(guard);

        let Ok(started) = late.await else {
            panic!("start task panicked");
        };
        let Ok(Ok(())) = tokio::time::timeout(Duration::from_secs(2), stopping).await else {
            panic!("shutdown did not finish");
        };

        assert!(registry.is_empty().await);
        let saved = db.load_session(&id("late")).await;
        match started {
            // Started first: shutdown must have saved it.
            Ok(()) => assert!(matches!(saved, Ok(Some(Counter { value: 0 })))),
            Err(err) => {
                assert!(matches!(err, GatewayError::SessionUnavailable(_)));
                assert!(matches!(saved, Ok(None)));
            }
        }
        assert!(matches!(
            registry.live_handle(&id("late")).await,
            Err(GatewayError::SessionUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_saves_live_sessions_and_refuses_new_ones() {
        let Ok(db) = SqlitePersistence::in_memory().await else {
            panic!("in-memory database");
        };
        let registry = SessionRegistry::start(Some(db.clone()), SessionSettings::default());
        let (conn, link_rx, _release) = holding();
        assert!(registry.attach(id("live"), conn).await.is_ok());
        let Ok(link) = link_rx.await else {
            panic!("link expected");
        };
        assert!(link.requests.send(Request::Decrement).await.is_ok());

        registry.shutdown().await;

        assert!(registry.is_empty().await);
        let loaded = db.load_session(&id("live")).await;
        assert!(matches!(loaded, Ok(Some(Counter { value: -1 }))));

        let (conn, _link_rx, _release) = holding();
        let refused = registry.attach(id("live"), conn).await;
        assert!(matches!(refused, Err(GatewayError::SessionUnavailable(_))));
    }
}
