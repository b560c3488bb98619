//! Client half: bridge a session socket into a reactive store.
//!
//! A [`MessageBridge`] listens to an established socket, decodes each
//! message as a [`CounterPayload`] and writes the value into a
//! [`CounterStore`] that UI code observes.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tally_gateway::error::BridgeError> {
//! use tally_gateway::bridge::{CounterStore, MessageBridge};
//!
//! let store = CounterStore::default();
//! let mut changes = store.subscribe();
//! tokio::spawn(async move {
//!     while changes.changed().await.is_ok() {
//!         println!("count = {}", *changes.borrow_and_update());
//!     }
//! });
//! MessageBridge::new(store)
//!     .connect("ws://127.0.0.1:4000/api/ws?uuid=test")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod listener;
pub mod payload;
pub mod store;

pub use listener::MessageBridge;
pub use payload::CounterPayload;
pub use store::CounterStore;
