//! Domain layer: counter state, session actors and their registry.
//!
//! Each session owns one [`Counter`] inside a [`session_actor`]; the
//! [`SessionRegistry`] starts, finds and retires those actors, and the
//! [`UpdateBus`] fans every counter change out to attached clients.

pub mod counter;
pub mod session_actor;
pub mod session_id;
pub mod session_registry;
pub mod update_bus;

pub use counter::{Counter, Request, Response, SessionState};
pub use session_actor::{Connection, SessionHandle, SessionLink};
pub use session_id::SessionId;
pub use session_registry::SessionRegistry;
pub use update_bus::UpdateBus;
