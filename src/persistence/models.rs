//! Database models for stored sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A row from the `sessions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoredSession {
    /// Session identifier (the `uuid` query parameter).
    pub id: String,
    /// Counter value at the time the session was last saved.
    pub value: i64,
    /// When the session was last saved.
    pub updated_at: DateTime<Utc>,
}
