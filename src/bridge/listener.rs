//! Socket listener that writes counter messages into a store.

use std::fmt;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

use super::payload;
use super::store::CounterStore;
use crate::error::BridgeError;

/// Callback receiving errors the bridge does not handle itself.
pub type ErrorHook = Arc<dyn Fn(&BridgeError) + Send + Sync>;

/// Forwards every counter message from a socket into a [`CounterStore`].
///
/// Messages are processed one at a time, in arrival order. A message that
/// fails to decode is passed to the error hook and leaves the store
/// untouched; the bridge then carries on with the next message. There is
/// no retry and no reconnect.
#[derive(Clone)]
pub struct MessageBridge {
    store: CounterStore,
    on_error: ErrorHook,
}

impl fmt::Debug for MessageBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBridge")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl MessageBridge {
    /// Creates a bridge writing into `store`.
    ///
    /// Unhandled errors are reported as `tracing` error events.
    #[must_use]
    pub fn new(store: CounterStore) -> Self {
        Self {
            store,
            on_error: Arc::new(report_unhandled),
        }
    }

    /// Replaces the hook that receives unhandled message errors.
    #[must_use]
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BridgeError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(hook);
        self
    }

    /// Returns the store this bridge writes into.
    #[must_use]
    pub const fn store(&self) -> &CounterStore {
        &self.store
    }

    /// Decodes one text payload and writes its value into the store.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Parse`] without touching the store if the
    /// payload is malformed.
    pub fn handle_text(&self, text: &str) -> Result<i64, BridgeError> {
        let value = payload::decode(text)?;
        tracing::debug!(value, "counter message received");
        self.store.set(value);
        Ok(value)
    }

    fn handle_binary(&self, bytes: &[u8]) -> Result<i64, BridgeError> {
        let value = payload::decode_slice(bytes)?;
        tracing::debug!(value, "counter message received");
        self.store.set(value);
        Ok(value)
    }

    /// Consumes an established socket until it closes.
    ///
    /// Text and binary frames are decoded as counter payloads; control
    /// frames are skipped. A close frame or the end of the stream ends
    /// the run.
    ///
    /// Returns the number of values written into the store.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the socket fails. Malformed
    /// messages never end the run.
    pub async fn run<S>(&self, mut socket: S) -> Result<usize, BridgeError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let mut applied = 0usize;
        while let Some(frame) = socket.next().await {
            let outcome = match frame? {
                Message::Text(text) => self.handle_text(text.as_str()),
                Message::Binary(bytes) => self.handle_binary(&bytes),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            match outcome {
                Ok(_) => applied = applied.saturating_add(1),
                Err(err) => (self.on_error)(&err),
            }
        }
        tracing::debug!(applied, "bridge socket closed");
        Ok(applied)
    }

    /// Runs the bridge on its own task. See [`MessageBridge::run`].
    pub fn attach<S>(self, socket: S) -> JoinHandle<Result<usize, BridgeError>>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send + 'static,
    {
        tokio::spawn(async move { self.run(socket).await })
    }

    /// Opens a socket to `url` and runs the bridge on it until it closes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the connection cannot be
    /// established or fails later.
    pub async fn connect(&self, url: &str) -> Result<usize, BridgeError> {
        let (socket, response) = tokio_tungstenite::connect_async(url).await?;
        tracing::info!(url, status = %response.status(), "bridge connected");
        self.run(socket).await
    }
}

/// Default error hook: report like an uncaught error would be.
fn report_unhandled(err: &BridgeError) {
    tracing::error!(error = %err, "unhandled error in socket message listener");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::stream;

    use super::*;

    fn frames(
        items: Vec<Result<Message, tungstenite::Error>>,
    ) -> impl Stream<Item = Result<Message, tungstenite::Error>> + Unpin {
        stream::iter(items)
    }

    fn text(s: &str) -> Result<Message, tungstenite::Error> {
        Ok(Message::text(s))
    }

    #[test]
    fn bare_number_sets_store() {
        let bridge = MessageBridge::new(CounterStore::default());
        assert!(matches!(bridge.handle_text("42"), Ok(42)));
        assert_eq!(bridge.store().get(), 42);
    }

    #[test]
    fn counter_object_sets_store() {
        let bridge = MessageBridge::new(CounterStore::default());
        assert!(matches!(bridge.handle_text(r#"{"Counter": 7}"#), Ok(7)));
        assert_eq!(bridge.store().get(), 7);
    }

    #[test]
    fn malformed_payload_leaves_store_untouched() {
        let store = CounterStore::new(3);
        let mut rx = store.subscribe();
        let bridge = MessageBridge::new(store.clone());

        assert!(matches!(bridge.handle_text("{oops"), Err(BridgeError::Parse(_))));
        assert_eq!(store.get(), 3);
        assert_eq!(store.writes(), 0);
        assert!(!rx.has_changed().unwrap_or(true));
    }

    #[tokio::test]
    async fn last_write_wins_in_arrival_order() {
        let store = CounterStore::default();
        let bridge = MessageBridge::new(store.clone());
        let socket = frames(vec![text("1"), text(r#"{"Counter": 2}"#), text("3")]);

        let applied = bridge.run(socket).await;
        assert!(matches!(applied, Ok(3)));
        assert_eq!(store.get(), 3);
        assert_eq!(store.writes(), 3);
    }

    #[tokio::test]
    async fn malformed_message_reaches_hook_and_run_continues() {
        let store = CounterStore::default();
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        let bridge = MessageBridge::new(store.clone()).with_error_hook(move |err| {
            assert!(matches!(err, BridgeError::Parse(_)));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let socket = frames(vec![text("5"), text("garbage"), text("6")]);

        let applied = bridge.run(socket).await;
        assert!(matches!(applied, Ok(2)));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(), 6);
    }

    #[tokio::test]
    async fn default_hook_reports_and_run_continues() {
        let store = CounterStore::default();
        let bridge = MessageBridge::new(store.clone());
        let socket = frames(vec![
            text("1"),
            text(r#"{"counter": 5}"#),
            Ok(Message::binary(b"\xff".to_vec())),
            text("2"),
        ]);

        let applied = bridge.run(socket).await;
        assert!(matches!(applied, Ok(2)));
        assert_eq!(store.get(), 2);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn control_frames_are_skipped_and_close_ends_run() {
        let store = CounterStore::default();
        let bridge = MessageBridge::new(store.clone());
        let socket = frames(vec![
            Ok(Message::Ping(vec![1, 2, 3].into())),
            text("8"),
            Ok(Message::Close(None)),
            text("9"),
        ]);

        let applied = bridge.run(socket).await;
        assert!(matches!(applied, Ok(1)));
        assert_eq!(store.get(), 8);
    }

    #[tokio::test]
    async fn binary_frames_are_decoded_as_json() {
        let store = CounterStore::default();
        let bridge = MessageBridge::new(store.clone());
        let socket = frames(vec![Ok(Message::binary(br#"{"Counter": 11}"#.to_vec()))]);

        assert!(matches!(bridge.run(socket).await, Ok(1)));
        assert_eq!(store.get(), 11);
    }

    #[tokio::test]
    async fn transport_error_ends_run_with_error() {
        let store = CounterStore::default();
        let bridge = MessageBridge::new(store.clone());
        let socket = frames(vec![
            text("4"),
            Err(tungstenite::Error::ConnectionClosed),
            text("5"),
        ]);

        let result = bridge.run(socket).await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
        assert_eq!(store.get(), 4);
    }

    #[tokio::test]
    async fn attach_runs_on_its_own_task() {
        let store = CounterStore::default();
        let values = Arc::new(Mutex::new(Vec::new()));
        let mut rx = store.subscribe();
        let collected = Arc::clone(&values);
        let watcher = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let v = *rx.borrow_and_update();
                if let Ok(mut guard) = collected.lock() {
                    guard.push(v);
                }
                if v == 30 {
                    break;
                }
            }
        });

        let handle = MessageBridge::new(store.clone())
            .attach(frames(vec![text("10"), text("20"), text("30")]));
        let Ok(Ok(applied)) = handle.await else {
            panic!("bridge task failed");
        };
        assert_eq!(applied, 3);
        let _ = watcher.await;
        assert_eq!(store.get(), 30);
        let Ok(seen) = values.lock() else {
            panic!("lock poisoned");
        };
        assert_eq!(seen.last(), Some(&30));
    }
}
