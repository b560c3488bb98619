//! SQLite implementation of the persistence layer.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use super::models::StoredSession;
use crate::config::GatewayConfig;
use crate::domain::{Counter, SessionId};
use crate::error::GatewayError;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed session store using `sqlx::SqlitePool`.
#[derive(Debug, Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Opens (creating if missing) the database named by
    /// `config.database_url` and applies pending migrations.
    ///
    /// The pool runs in WAL mode so readers never block on the writer.
    /// Migrations are skipped for read-only databases.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::Persistence`] if the URL is invalid or
    /// migrations fail.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| GatewayError::Persistence(e.to_string()))?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
            .read_only(config.database_read_only);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.database_max_connections.max(1))
            .connect_lazy_with(options);

        let persistence = Self { pool };
        if !config.database_read_only {
            persistence.migrate().await?;
        }
        Ok(persistence)
    }

    /// Opens a private in-memory database. Intended for tests.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::Persistence`] if the connection or the
    /// migrations fail.
    pub async fn in_memory() -> Result<Self, GatewayError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| GatewayError::Persistence(e.to_string()))?;

        // Every in-memory connection is its own database: keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| GatewayError::Persistence(e.to_string()))?;

        let persistence = Self { pool };
        persistence.migrate().await?;
        Ok(persistence)
    }

    async fn migrate(&self) -> Result<(), GatewayError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| GatewayError::Persistence(e.to_string()))
    }

    /// Loads the saved counter for a session, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::Persistence`] on database failure.
    pub async fn load_session(&self, id: &SessionId) -> Result<Option<Counter>, GatewayError> {
        let value = sqlx::query_scalar::<_, i64>("SELECT value FROM sessions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GatewayError::Persistence(e.to_string()))?;

        Ok(value.map(Counter::new))
    }

    /// Inserts or overwrites the saved counter for a session.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::Persistence`] on database failure.
    pub async fn save_session(&self, id: &SessionId, counter: &Counter) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO sessions (id, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(counter.value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Persistence(e.to_string()))?;

        Ok(())
    }

    /// Lists every saved session ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::Persistence`] on database failure.
    pub async fn list_sessions(&self) -> Result<Vec<StoredSession>, GatewayError> {
        let rows = sqlx::query_as::<_, (String, i64, DateTime<Utc>)>(
            "SELECT id, value, updated_at FROM sessions ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::Persistence(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(id, value, updated_at)| StoredSession {
                id,
                value,
                updated_at,
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    async fn store() -> SqlitePersistence {
        let Ok(store) = SqlitePersistence::in_memory().await else {
            panic!("in-memory database should open");
        };
        store
    }

    fn id(raw: &str) -> SessionId {
        let Ok(id) = SessionId::parse(raw) else {
            panic!("valid id");
        };
        id
    }

    #[tokio::test]
    async fn unknown_session_loads_none() {
        let db = store().await;
        let loaded = db.load_session(&id("missing")).await;
        assert!(matches!(loaded, Ok(None)));
    }

    #[tokio::test]
    async fn save_then_load() {
        let db = store().await;
        assert!(db.save_session(&id("a"), &Counter::new(12)).await.is_ok());
        let loaded = db.load_session(&id("a")).await;
        assert!(matches!(loaded, Ok(Some(Counter { value: 12 }))));
    }

    #[tokio::test]
    async fn save_overwrites_previous_value() {
        let db = store().await;
        assert!(db.save_session(&id("a"), &Counter::new(1)).await.is_ok());
        assert!(db.save_session(&id("a"), &Counter::new(-4)).await.is_ok());
        let loaded = db.load_session(&id("a")).await;
        assert!(matches!(loaded, Ok(Some(Counter { value: -4 }))));
    }

    #[tokio::test]
    async fn list_is_ordered_by_id() {
        let db = store().await;
        assert!(db.save_session(&id("b"), &Counter::new(2)).await.is_ok());
        assert!(db.save_session(&id("a"), &Counter::new(1)).await.is_ok());

        let Ok(rows) = db.list_sessions().await else {
            panic!("list should succeed");
        };
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(rows.iter().map(|r| r.value).sum::<i64>(), 3);
    }
}
