//! # tally-gateway
//!
//! WebSocket gateway for shared session counters, plus the client-side
//! bridge that mirrors a session's counter into a reactive store.
//!
//! Every session id owns one counter held by a session actor. Clients
//! attached to the same id see each other's increments, decrements and
//! resets. An actor left without clients shuts down after a grace period
//! and saves its counter to SQLite, so the next client resumes where the
//! last one left off.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket /api/ws?uuid=..., HTTP /api, /health)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── SessionRegistry (domain/)
//!     ├── SessionActor + UpdateBus (domain/)
//!     │
//!     └── SQLite Persistence (persistence/)
//!
//! Client side
//!     MessageBridge (bridge/) ── socket ──▶ CounterStore
//!     ProxyConfig (proxy) maps dev-server paths onto the gateway
//! ```

pub mod api;
pub mod app_state;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod proxy;
pub mod ws;
