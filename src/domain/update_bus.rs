//! Broadcast channel for one session's counter updates.
//!
//! [`UpdateBus`] wraps a [`tokio::sync::broadcast`] channel. The session
//! actor publishes every [`Response`] it produces and each attached client
//! connection holds its own receiver.

use tokio::sync::broadcast;

use super::counter::Response;

/// Broadcast bus for [`Response`]s of a single session.
///
/// When the ring buffer is full, the oldest updates are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct UpdateBus {
    sender: broadcast::Sender<Response>,
}

impl UpdateBus {
    /// Creates a new `UpdateBus` with the given channel capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an update to all subscribers.
    ///
    /// Returns the number of receivers that received the update.
    /// If there are no active receivers, the update is silently dropped.
    pub fn publish(&self, update: Response) -> usize {
        self.sender.send(update).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Response> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
