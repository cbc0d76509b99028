//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies. Endpoints that
//! return reports (stats, metrics, alerts, rules) serialize the domain
//! types directly instead.

use serde::Serialize;

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status, "healthy" or "degraded"
    pub status: String,
    /// Whether the backing store answered a ping
    pub store_connected: bool,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a health response for the given store state.
    pub fn new(store_connected: bool) -> Self {
        Self {
            status: if store_connected {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            store_connected,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for invalidation endpoints
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationResponse {
    /// Number of cache keys invalidated
    pub invalidated: u64,
}

/// Response body for clear and counter-reset endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Number of keys deleted
    pub deleted: u64,
}

/// Response body for the warmup endpoint
#[derive(Debug, Clone, Serialize)]
pub struct WarmupResponse {
    /// Number of entries written
    pub stored: usize,
}

/// Generic acknowledgement body
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_states() {
        let healthy = HealthResponse::new(true);
        assert_eq!(healthy.status, "healthy");
        let degraded = HealthResponse::new(false);
        assert_eq!(degraded.status, "degraded");
        assert!(!degraded.store_connected);
    }

    #[test]
    fn test_health_response_serialize() {
        let json = serde_json::to_string(&HealthResponse::new(true)).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_invalidation_response_serialize() {
        let json = serde_json::to_string(&InvalidationResponse { invalidated: 3 }).unwrap();
        assert!(json.contains("\"invalidated\":3"));
    }
}
