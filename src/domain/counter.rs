//! Session counter state and its wire messages.
//!
//! Clients send [`Request`]s (`"Increment"`, `"Decrement"`, `"Reset"`),
//! the session answers with [`Response`]s serialized as
//! `{"Counter": N}`, the shape the message bridge decodes.

use serde::{Deserialize, Serialize};

/// Command sent by a client over the session socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Add one to the counter.
    Increment,
    /// Subtract one from the counter.
    Decrement,
    /// Set the counter back to zero.
    Reset,
}

/// Update pushed from a session to its clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// The counter's new value.
    Counter(i64),
}

/// State owned by a session actor.
///
/// `update` applies one request and yields the responses to broadcast;
/// `dump` yields the responses that bring a fresh client up to date.
pub trait SessionState {
    /// Applies `req` and returns the responses it produced, in order.
    fn update(&mut self, req: Request) -> Vec<Response>;

    /// Returns responses describing the complete current state.
    fn dump(&self) -> Vec<Response>;
}

/// Shared integer counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counter {
    /// Current value.
    pub value: i64,
}

impl Counter {
    /// Creates a counter starting at `value`.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self { value }
    }
}

impl SessionState for Counter {
    fn update(&mut self, req: Request) -> Vec<Response> {
        match req {
            Request::Increment => self.value = self.value.saturating_add(1),
            Request::Decrement => self.value = self.value.saturating_sub(1),
            Request::Reset => self.value = 0,
        }
        vec![Response::Counter(self.value)]
    }

    fn dump(&self) -> Vec<Response> {
        vec![Response::Counter(self.value)]
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn increment_decrement_reset() {
        let mut c = Counter::default();
        assert_eq!(c.update(Request::Increment), vec![Response::Counter(1)]);
        assert_eq!(c.update(Request::Increment), vec![Response::Counter(2)]);
        assert_eq!(c.update(Request::Decrement), vec![Response::Counter(1)]);
        assert_eq!(c.update(Request::Reset), vec![Response::Counter(0)]);
        assert_eq!(c.value, 0);
    }

    #[test]
    fn saturates_at_bounds() {
        let mut hi = Counter::new(i64::MAX);
        assert_eq!(hi.update(Request::Increment), vec![Response::Counter(i64::MAX)]);
        let mut lo = Counter::new(i64::MIN);
        assert_eq!(lo.update(Request::Decrement), vec![Response::Counter(i64::MIN)]);
    }

    #[test]
    fn dump_reports_current_value() {
        let c = Counter::new(-3);
        assert_eq!(c.dump(), vec![Response::Counter(-3)]);
    }

    #[test]
    fn response_wire_shape_uses_capitalized_counter_key() {
        let json = serde_json::to_string(&Response::Counter(7)).unwrap_or_default();
        assert_eq!(json, r#"{"Counter":7}"#);
    }

    #[test]
    fn request_wire_shape_is_bare_string() {
        let Ok(req) = serde_json::from_str::<Request>(r#""Decrement""#) else {
            panic!("expected Decrement to decode");
        };
        assert_eq!(req, Request::Decrement);
        assert!(serde_json::from_str::<Request>(r#""increment""#).is_err());
    }
}
