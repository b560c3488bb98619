//! Type-safe session identifier.
//!
//! [`SessionId`] wraps the `uuid` query parameter a client connects with.
//! The value is opaque: any non-empty string up to
//! [`SessionId::MAX_LEN`] characters names a session, so `uuid=test`
//! is as valid as a real UUID.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Identifier shared by every socket attached to the same counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Longest accepted identifier, in characters.
    pub const MAX_LEN: usize = 128;

    /// Validates and wraps a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidSessionId`] if `raw` is empty, too
    /// long, or contains control characters.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        if raw.is_empty() {
            return Err(GatewayError::InvalidSessionId(
                "session id must not be empty".to_string(),
            ));
        }
        if raw.chars().count() > Self::MAX_LEN {
            return Err(GatewayError::InvalidSessionId(format!(
                "session id longer than {} characters",
                Self::MAX_LEN
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(GatewayError::InvalidSessionId(
                "session id contains control characters".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
