//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::SessionRegistry;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Registry of live counter sessions.
    pub sessions: Arc<SessionRegistry>,
}
