//! Persistence layer: SQLite storage for session counters.
//!
//! A session's counter is saved when its actor stops and loaded again
//! when the next client attaches. The implementation uses
//! `sqlx::SqlitePool` for async SQLite access.

pub mod models;
pub mod sqlite;

pub use models::StoredSession;
pub use sqlite::SqlitePersistence;
