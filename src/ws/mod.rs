//! WebSocket layer: upgrade handling and the per-client connection loop.
//!
//! The endpoint at `/api/ws?uuid=<id>` joins the client to the counter
//! session `<id>`. Clients send `"Increment"`, `"Decrement"` or `"Reset"`
//! and receive every new value as `{"Counter": N}`.

pub mod connection;
pub mod handler;
