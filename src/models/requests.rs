//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::WarmupEntry;

/// Request body for POST /admin/cache/warmup
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupRequest {
    pub entries: Vec<WarmupEntry>,
}

impl WarmupRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.entries.is_empty() {
            return Some("Warmup entry list cannot be empty".to_string());
        }
        if self.entries.iter().any(|entry| entry.key.is_empty()) {
            return Some("Warmup keys cannot be empty".to_string());
        }
        None
    }
}

/// Request body for POST /admin/cache/clear
#[derive(Debug, Clone, Deserialize)]
pub struct ClearRequest {
    /// Glob pattern over logical cache keys
    pub pattern: String,
}

impl ClearRequest {
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        None
    }
}

/// Request body for POST /admin/invalidate/tag
#[derive(Debug, Clone, Deserialize)]
pub struct TagInvalidationRequest {
    pub tag: String,
    /// Whether to also invalidate direct dependents of each tagged key
    #[serde(default)]
    pub cascade: bool,
}

/// Request body for POST /admin/invalidate/pattern
#[derive(Debug, Clone, Deserialize)]
pub struct PatternInvalidationRequest {
    pub pattern: String,
}

/// Request body for the whitelist/blacklist endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ListEntryRequest {
    /// IP address or user id to add
    pub identifier: String,
    /// Optional TTL in seconds applied to the list
    #[serde(default)]
    pub ttl: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_warmup_request_deserialize() {
        let body = json!({
            "entries": [
                {"key": "q1", "value": {"text": "hi"}, "ttl": 60, "tags": ["user:42"]},
                {"key": "q2", "value": 7}
            ]
        });
        let req: WarmupRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.entries.len(), 2);
        assert_eq!(req.entries[0].ttl, Some(60));
        assert!(req.entries[1].tags.is_empty());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_warmup_request_rejects_empty() {
        let req = WarmupRequest { entries: vec![] };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_clear_request_rejects_empty_pattern() {
        let req: ClearRequest = serde_json::from_str(r#"{"pattern": ""}"#).unwrap();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_tag_request_cascade_defaults_false() {
        let req: TagInvalidationRequest =
            serde_json::from_str(r#"{"tag": "user:42"}"#).unwrap();
        assert!(!req.cascade);
    }

    #[test]
    fn test_list_entry_request() {
        let req: ListEntryRequest =
            serde_json::from_str(r#"{"identifier": "10.0.0.1", "ttl": 3600}"#).unwrap();
        assert_eq!(req.identifier, "10.0.0.1");
        assert_eq!(req.ttl, Some(3600));
    }
}
