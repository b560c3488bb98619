//! Counter wire payload accepted by the bridge.
//!
//! A message is either a bare JSON integer (`42`) or an object with the
//! case-sensitive key `Counter` (`{"Counter": 42}`); other keys in the
//! object are ignored. Anything else is rejected.

use serde::Deserialize;

use crate::error::BridgeError;

/// One decoded counter message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CounterPayload {
    /// `42`
    Bare(i64),
    /// `{"Counter": 42}`
    Object {
        /// The counter value.
        #[serde(rename = "Counter")]
        counter: i64,
    },
}

impl CounterPayload {
    /// Returns the counter value carried by either shape.
    #[must_use]
    pub const fn value(self) -> i64 {
        match self {
            Self::Bare(value) | Self::Object { counter: value } => value,
        }
    }
}

/// Decodes a text payload into its counter value.
///
/// # Errors
///
/// Returns [`BridgeError::Parse`] if `text` is not JSON or has neither
/// accepted shape.
pub fn decode(text: &str) -> Result<i64, BridgeError> {
    Ok(serde_json::from_str::<CounterPayload>(text)?.value())
}

/// Decodes a binary payload (UTF-8 JSON) into its counter value.
///
/// # Errors
///
/// Returns [`BridgeError::Parse`] if `bytes` is not UTF-8 JSON or has
/// neither accepted shape.
pub fn decode_slice(bytes: &[u8]) -> Result<i64, BridgeError> {
    Ok(serde_json::from_slice::<CounterPayload>(bytes)?.value())
}
