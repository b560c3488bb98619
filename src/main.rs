//! tally-gateway server entry point.
//!
//! Starts the Axum HTTP server with the session socket and REST
//! endpoints, and saves every live session on shutdown.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use tally_gateway::api;
use tally_gateway::app_state::AppState;
use tally_gateway::config::GatewayConfig;
use tally_gateway::domain::SessionRegistry;
use tally_gateway::persistence::SqlitePersistence;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting tally-gateway");

    // Persistence
    let persistence = if config.persistence_enabled {
        tracing::info!(url = %config.database_url, "opening session database");
        Some(SqlitePersistence::connect(&config).await?)
    } else {
        tracing::warn!("persistence disabled; counters reset when sessions go idle");
        None
    };

    // Build domain layer
    let sessions = SessionRegistry::start(persistence, config.session);

    // Build router
    let app = api::build_app(AppState {
        sessions: Arc::clone(&sessions),
    });

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("saving live sessions");
    sessions.shutdown().await;
    tracing::info!("shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
