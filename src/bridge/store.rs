//! Reactive counter cell.
//!
//! [`CounterStore`] is an explicit, cloneable value holder backed by a
//! [`tokio::sync::watch`] channel. Clones share the same cell; every
//! [`CounterStore::set`] notifies subscribers, even when the value is
//! unchanged.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Shared integer state observed by UI code.
#[derive(Debug, Clone)]
pub struct CounterStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    value: watch::Sender<i64>,
    writes: AtomicU64,
}

impl CounterStore {
    /// Creates a store holding `initial`.
    #[must_use]
    pub fn new(initial: i64) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                value,
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// Replaces the value and notifies every subscriber.
    pub fn set(&self, value: i64) {
        self.inner.value.send_replace(value);
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        *self.inner.value.borrow()
    }

    /// Returns a receiver that observes every future write.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.inner.value.subscribe()
    }

    /// Returns how many writes the store has received.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new(0)
    }
}
