//! Error types for the gateway, the message bridge and proxy rules.
//!
//! [`GatewayError`] is the central server-side error type. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! [`BridgeError`] and [`ProxyError`] cover the client half.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid session id: missing `uuid` query parameter"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1000–1999 | Validation      | 404 Not Found             |
/// | 2000–2999 | Session state   | 503 Service Unavailable   |
/// | 3000–3999 | Server          | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The `uuid` query parameter is missing or unusable.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// The session actor stopped before the connection could attach.
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidSessionId(_) => 1001,
            Self::SessionUnavailable(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSessionId(_) => StatusCode::NOT_FOUND,
            Self::SessionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Failure while bridging socket messages into a store.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The payload is not JSON, or is JSON of neither accepted shape.
    #[error("malformed counter payload: {0}")]
    Parse(#[from] serde_json::Error),

    /// The socket failed to connect or broke mid-stream.
    #[error("socket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Invalid dev proxy rule.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Rule prefix does not start with `/`.
    #[error("proxy prefix must start with '/': {0:?}")]
    InvalidPrefix(String),

    /// Target is not an absolute URI with a host.
    #[error("invalid proxy target {target:?}: {reason}")]
    InvalidTarget {
        /// The offending target string.
        target: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Websocket rules need `ws`/`wss` targets, plain rules `http`/`https`.
    #[error("proxy target {target:?} has scheme {scheme:?}, expected {expected}")]
    SchemeMismatch {
        /// The offending target string.
        target: String,
        /// Scheme found on the target.
        scheme: String,
        /// Schemes allowed for this rule kind.
        expected: &'static str,
    },

    /// Rule document is not valid JSON.
    #[error("proxy config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
