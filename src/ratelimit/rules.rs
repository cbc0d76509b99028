//! Rate Limit Rules Module
//!
//! Rule definitions, key-extraction strategies, and the default rule set
//! shipped for the interview backend's endpoint classes.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, Result};

/// Fallback window when a rule is registered with a zero window.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Fallback quota when a rule is registered with a zero quota.
pub const DEFAULT_MAX_REQUESTS: u64 = 100;

// == Key Strategy ==
/// How the counter key is derived from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrategy {
    /// Count per client IP
    Ip,
    /// Count per authenticated user
    User,
    /// Count per IP, falling back to the user id for proxied clients
    IpOrUser,
}

impl KeyStrategy {
    /// Extracts the counting subject from a request. Requests with neither
    /// attribute share the `unknown` bucket.
    pub fn extract(&self, request: &RequestContext) -> String {
        let subject = match self {
            KeyStrategy::Ip => request.ip.clone(),
            KeyStrategy::User => request.user_id.clone(),
            KeyStrategy::IpOrUser => request.ip.clone().or_else(|| request.user_id.clone()),
        };
        subject.unwrap_or_else(|| "unknown".to_string())
    }
}

// == Request Context ==
/// The per-request attributes the limiter can key on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_id: Option<String>,
}

impl RequestContext {
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_id: None,
        }
    }

    pub fn from_user(user_id: impl Into<String>) -> Self {
        Self {
            ip: None,
            user_id: Some(user_id.into()),
        }
    }
}

// == Rate Limit Rule ==
/// A named fixed-window quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub id: String,
    pub window_ms: u64,
    pub max_requests: u64,
    pub key_strategy: KeyStrategy,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RateLimitRule {
    pub fn new(
        id: impl Into<String>,
        window_ms: u64,
        max_requests: u64,
        key_strategy: KeyStrategy,
    ) -> Self {
        Self {
            id: id.into(),
            window_ms,
            max_requests,
            key_strategy,
            enabled: true,
        }
    }

    /// Validates the rule for registration. An empty id is rejected; zero
    /// numeric fields fall back to defaults instead.
    pub fn validated(mut self) -> Result<Self> {
        if self.id.trim().is_empty() {
            return Err(CacheError::Configuration(
                "Rule id cannot be empty".to_string(),
            ));
        }
        if self.window_ms == 0 {
            warn!(
                "Rule '{}' registered with zero window, using {} ms",
                self.id, DEFAULT_WINDOW_MS
            );
            self.window_ms = DEFAULT_WINDOW_MS;
        }
        if self.max_requests == 0 {
            warn!(
                "Rule '{}' registered with zero quota, using {}",
                self.id, DEFAULT_MAX_REQUESTS
            );
            self.max_requests = DEFAULT_MAX_REQUESTS;
        }
        Ok(self)
    }
}

// == Default Rules ==
/// The rule set seeded at startup: general API traffic, login attempts,
/// the resource-intensive transcription and response-generation endpoints,
/// real-time connection attempts, and a per-authenticated-user ceiling.
pub fn default_rules() -> Vec<RateLimitRule> {
    vec![
        RateLimitRule::new("api-general", 60_000, 100, KeyStrategy::IpOrUser),
        RateLimitRule::new("auth-login", 300_000, 5, KeyStrategy::Ip),
        RateLimitRule::new("transcription", 60_000, 10, KeyStrategy::User),
        RateLimitRule::new("response-generation", 60_000, 20, KeyStrategy::User),
        RateLimitRule::new("realtime-connect", 60_000, 30, KeyStrategy::Ip),
        RateLimitRule::new("user-requests", 60_000, 300, KeyStrategy::User),
    ]
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_by_ip() {
        let request = RequestContext::from_ip("10.0.0.1");
        assert_eq!(KeyStrategy::Ip.extract(&request), "10.0.0.1");
    }

    #[test]
    fn test_extract_ip_or_user_fallback() {
        let by_user = RequestContext::from_user("u42");
        assert_eq!(KeyStrategy::IpOrUser.extract(&by_user), "u42");

        let both = RequestContext {
            ip: Some("10.0.0.1".into()),
            user_id: Some("u42".into()),
        };
        assert_eq!(KeyStrategy::IpOrUser.extract(&both), "10.0.0.1");
    }

    #[test]
    fn test_extract_missing_attributes() {
        let empty = RequestContext::default();
        assert_eq!(KeyStrategy::User.extract(&empty), "unknown");
    }

    #[test]
    fn test_validated_rejects_empty_id() {
        let rule = RateLimitRule::new("  ", 1000, 10, KeyStrategy::Ip);
        assert!(rule.validated().is_err());
    }

    #[test]
    fn test_validated_defaults_zero_numerics() {
        let rule = RateLimitRule::new("r", 0, 0, KeyStrategy::Ip)
            .validated()
            .unwrap();
        assert_eq!(rule.window_ms, DEFAULT_WINDOW_MS);
        assert_eq!(rule.max_requests, DEFAULT_MAX_REQUESTS);
    }

    #[test]
    fn test_default_rules_include_login_quota() {
        let rules = default_rules();
        let login = rules.iter().find(|r| r.id == "auth-login").unwrap();
        assert_eq!(login.window_ms, 300_000);
        assert_eq!(login.max_requests, 5);
        assert!(rules.iter().all(|r| r.enabled));
    }
}
