//! Dev-server proxy rules.
//!
//! Declarative routing metadata for a front-end development server:
//! requests under a path prefix are forwarded to the gateway, and socket
//! upgrades under `/api/ws` go to its session endpoint. Nothing here
//! opens connections; the rules are only matched and rendered into
//! upstream URLs.

use axum::http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// Whether a request is a plain HTTP request or a socket upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Ordinary HTTP request.
    Http,
    /// WebSocket upgrade request.
    Upgrade,
}

/// One forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRule {
    /// Path prefix, matched on segment boundaries (e.g. `/api`).
    pub prefix: String,
    /// Upstream base URL (e.g. `http://127.0.0.1:4000`).
    pub target: String,
    /// Rule forwards socket upgrades instead of plain requests.
    #[serde(default)]
    pub websocket: bool,
    /// Rewrite the `Host` header to the target's authority.
    #[serde(default)]
    pub change_origin: bool,
}

impl ProxyRule {
    /// Plain HTTP forwarding rule.
    #[must_use]
    pub fn http(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: target.into(),
            websocket: false,
            change_origin: false,
        }
    }

    /// Socket upgrade forwarding rule.
    #[must_use]
    pub fn websocket(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            websocket: true,
            ..Self::http(prefix, target)
        }
    }

    /// Sets [`ProxyRule::change_origin`].
    #[must_use]
    pub fn with_change_origin(mut self, change_origin: bool) -> Self {
        self.change_origin = change_origin;
        self
    }

    /// Returns `true` if the rule handles requests of this kind.
    #[must_use]
    pub const fn serves(&self, kind: RequestKind) -> bool {
        match kind {
            RequestKind::Http => !self.websocket,
            RequestKind::Upgrade => self.websocket,
        }
    }

    /// Returns `true` if `path` (without query) falls under the prefix.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.base()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Checks the prefix and the target URL.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidPrefix`] if the prefix does not start
    /// with `/`, [`ProxyError::InvalidTarget`] if the target is not an
    /// absolute URL, or [`ProxyError::SchemeMismatch`] if its scheme does
    /// not suit the rule kind.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if !self.prefix.starts_with('/') {
            return Err(ProxyError::InvalidPrefix(self.prefix.clone()));
        }
        let uri = self.target_uri()?;
        let scheme = uri.scheme_str().unwrap_or_default();
        let (allowed, expected) = if self.websocket {
            (["ws", "wss"], "ws or wss")
        } else {
            (["http", "https"], "http or https")
        };
        if !allowed.contains(&scheme) {
            return Err(ProxyError::SchemeMismatch {
                target: self.target.clone(),
                scheme: scheme.to_string(),
                expected,
            });
        }
        Ok(())
    }

    /// Renders the upstream URL for `path_and_query`, or `None` when the
    /// rule does not match or its target is invalid.
    ///
    /// A target with a path replaces the matched prefix with that path;
    /// a bare origin keeps the request path as is. The query string is
    /// carried over.
    #[must_use]
    pub fn forward_url(&self, path_and_query: &str) -> Option<String> {
        let (path, query) = split_query(path_and_query);
        if !self.matches(path) {
            return None;
        }
        let uri = self.target_uri().ok()?;
        let scheme = uri.scheme_str()?;
        let authority = uri.authority()?;

        let target_path = uri.path().trim_end_matches('/');
        let upstream_path = if target_path.is_empty() {
            path.to_string()
        } else {
            let rest = path.strip_prefix(self.base()).unwrap_or_default();
            format!("{target_path}{rest}")
        };

        Some(match query {
            Some(q) => format!("{scheme}://{authority}{upstream_path}?{q}"),
            None => format!("{scheme}://{authority}{upstream_path}"),
        })
    }

    /// Prefix without trailing slash; `/` becomes the empty string and
    /// matches everything.
    fn base(&self) -> &str {
        self.prefix.trim_end_matches('/')
    }

    fn target_uri(&self) -> Result<Uri, ProxyError> {
        let uri: Uri = self.target.parse().map_err(|e: axum::http::uri::InvalidUri| {
            ProxyError::InvalidTarget {
                target: self.target.clone(),
                reason: e.to_string(),
            }
        })?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(ProxyError::InvalidTarget {
                target: self.target.clone(),
                reason: "expected an absolute URL with scheme and host".to_string(),
            });
        }
        Ok(uri)
    }
}

/// Ordered set of proxy rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Rules in declaration order.
    pub rules: Vec<ProxyRule>,
}

impl ProxyConfig {
    /// Rules of the development setup: `/api` to the gateway on port
    /// 4000, and socket upgrades on `/api/ws` to its session endpoint.
    #[must_use]
    pub fn dev_default() -> Self {
        Self {
            rules: vec![
                ProxyRule::http("/api", "http://127.0.0.1:4000").with_change_origin(true),
                ProxyRule::websocket("/api/ws", "ws://127.0.0.1:4000/api/ws"),
            ],
        }
    }

    /// Parses and validates a JSON rule document
    /// (`{"rules": [{"prefix": "/api", "target": "http://..."}]}`).
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Parse`] for malformed JSON, or the first
    /// validation error of any rule.
    pub fn from_json(json: &str) -> Result<Self, ProxyError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every rule.
    ///
    /// # Errors
    ///
    /// Returns the first rule's validation error.
    pub fn validate(&self) -> Result<(), ProxyError> {
        self.rules.iter().try_for_each(ProxyRule::validate)
    }

    /// Picks the rule for a request: among rules serving `kind` and
    /// matching the path, the longest prefix wins; ties go to the rule
    /// declared first.
    #[must_use]
    pub fn route(&self, path_and_query: &str, kind: RequestKind) -> Option<&ProxyRule> {
        let (path, _) = split_query(path_and_query);
        let mut best: Option<&ProxyRule> = None;
        for rule in self.rules.iter().filter(|r| r.serves(kind) && r.matches(path)) {
            if best.is_none_or(|b| rule.base().len() > b.base().len()) {
                best = Some(rule);
            }
        }
        best
    }

    /// Renders the upstream URL for a request, if any rule routes it.
    #[must_use]
    pub fn forward_url(&self, path_and_query: &str, kind: RequestKind) -> Option<String> {
        self.route(path_and_query, kind)?.forward_url(path_and_query)
    }
}

fn split_query(path_and_query: &str) -> (&str, Option<&str>) {
    match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    }
}
