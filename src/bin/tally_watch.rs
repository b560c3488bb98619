//! tally-watch: mirror one session's counter into a local store and log
//! every change.
//!
//! The socket URL comes from `BRIDGE_URL`, or from `BRIDGE_PATH` routed
//! through the dev proxy rules.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tally_gateway::bridge::{CounterStore, MessageBridge};
use tally_gateway::config::WatchConfig;
use tally_gateway::proxy::{ProxyConfig, RequestKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WatchConfig::from_env();
    let url = match config.url {
        Some(url) => url,
        None => ProxyConfig::dev_default()
            .forward_url(&config.path, RequestKind::Upgrade)
            .with_context(|| format!("no proxy rule routes socket path `{}`", config.path))?,
    };

    let store = CounterStore::default();
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let value = *changes.borrow_and_update();
            tracing::info!(value, "counter changed");
        }
    });

    let applied = MessageBridge::new(store.clone())
        .connect(&url)
        .await
        .with_context(|| format!("bridge to {url} failed"))?;
    tracing::info!(applied, last = store.get(), "socket closed");
    Ok(())
}
