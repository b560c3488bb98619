//! Gateway and watcher configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `127.0.0.1:4000`).
    pub listen_addr: SocketAddr,

    /// SQLite connection string (e.g. `sqlite://tally.db`).
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Open the database read-only.
    pub database_read_only: bool,

    /// Master switch for the persistence layer.
    pub persistence_enabled: bool,

    /// Per-session tuning shared by every actor.
    pub session: SessionSettings,
}

/// Tuning knobs for session actors and their client connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// How long an actor with no attached clients stays alive.
    pub idle_timeout: Duration,

    /// Close a client socket after this long without an inbound frame.
    pub client_inactivity_timeout: Duration,

    /// Capacity of each session's update broadcast channel.
    pub update_bus_capacity: usize,

    /// Capacity of each session's request channel.
    pub request_channel_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15),
            client_inactivity_timeout: Duration::from_secs(60 * 15),
            update_bus_capacity: 256,
            request_channel_capacity: 32,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:4000".to_string())
            .parse()?;

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://tally.db".to_string());

        let database_max_connections = parse_env("DATABASE_MAX_CONNECTIONS", 64);
        let database_read_only = parse_env_bool("DATABASE_READ_ONLY", false);
        let persistence_enabled = parse_env_bool("PERSISTENCE_ENABLED", true);

        let defaults = SessionSettings::default();
        let session = SessionSettings {
            idle_timeout: Duration::from_secs(parse_env(
                "SESSION_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )),
            client_inactivity_timeout: Duration::from_secs(parse_env(
                "CLIENT_INACTIVITY_TIMEOUT_SECS",
                defaults.client_inactivity_timeout.as_secs(),
            )),
            // Zero-capacity channels panic in tokio.
            update_bus_capacity: parse_env("UPDATE_BUS_CAPACITY", defaults.update_bus_capacity)
                .max(1),
            request_channel_capacity: parse_env(
                "REQUEST_CHANNEL_CAPACITY",
                defaults.request_channel_capacity,
            )
            .max(1),
        };

        Ok(Self {
            listen_addr,
            database_url,
            database_max_connections,
            database_read_only,
            persistence_enabled,
            session,
        })
    }
}

/// Configuration for the `tally-watch` bridge client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Explicit upstream socket URL. Wins over `path` when set.
    pub url: Option<String>,

    /// Dev-server path resolved through the default proxy rules.
    pub path: String,
}

impl WatchConfig {
    /// Loads the watcher configuration from `BRIDGE_URL` / `BRIDGE_PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            url: std::env::var("BRIDGE_URL").ok().filter(|u| !u.is_empty()),
            path: std::env::var("BRIDGE_PATH")
                .unwrap_or_else(|_| "/api/ws?uuid=test".to_string()),
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw == "1" || raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw == "0" || raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
