//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backing store connection URL (e.g. redis://127.0.0.1:6379).
    /// When absent or unreachable the service falls back to the in-memory store.
    pub store_url: Option<String>,
    /// Admin HTTP server port
    pub server_port: u16,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Maximum number of cache entries before eviction kicks in
    pub max_entries: usize,
    /// Whether payloads above the size threshold are gzip-compressed
    pub compression_enabled: bool,
    /// Whether cache/rate-limit operations record metrics
    pub metrics_enabled: bool,
    /// Whether rate limiting is enforced at all
    pub rate_limiting_enabled: bool,
    /// Background cache sweep interval in seconds
    pub cleanup_interval: u64,
    /// System metrics sampling interval in seconds
    pub sampling_interval: u64,
    /// Alerting thresholds for the performance monitor
    pub alerts: AlertThresholds,
}

/// Threshold pairs for performance alerts. Each metric has a warning level
/// and a critical level.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    /// Cache hit rate floor (warning below this)
    pub hit_rate_warn: f64,
    /// Cache hit rate floor (critical below this)
    pub hit_rate_crit: f64,
    /// Average cache latency ceiling in milliseconds
    pub latency_warn_ms: f64,
    pub latency_crit_ms: f64,
    /// Store memory usage ceiling in bytes
    pub memory_warn_bytes: u64,
    pub memory_crit_bytes: u64,
    /// Request error rate ceiling (0.0 - 1.0)
    pub error_rate_warn: f64,
    pub error_rate_crit: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            hit_rate_warn: 0.80,
            hit_rate_crit: 0.60,
            latency_warn_ms: 100.0,
            latency_crit_ms: 200.0,
            memory_warn_bytes: 512 * 1024 * 1024,
            memory_crit_bytes: 1024 * 1024 * 1024,
            error_rate_warn: 0.05,
            error_rate_crit: 0.10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `STORE_URL` - Backing store URL (default: none, in-memory fallback)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 10000)
    /// - `COMPRESSION_ENABLED` - Compress large payloads (default: true)
    /// - `METRICS_ENABLED` - Record operation metrics (default: true)
    /// - `RATE_LIMITING_ENABLED` - Enforce rate limits (default: true)
    /// - `CLEANUP_INTERVAL` - Cache sweep frequency in seconds (default: 300)
    /// - `SAMPLING_INTERVAL` - System sampling frequency in seconds (default: 30)
    /// - `ALERT_HIT_RATE_WARN` / `ALERT_HIT_RATE_CRIT` - Hit rate floors
    /// - `ALERT_LATENCY_WARN_MS` / `ALERT_LATENCY_CRIT_MS` - Latency ceilings
    /// - `ALERT_MEMORY_WARN_BYTES` / `ALERT_MEMORY_CRIT_BYTES` - Memory ceilings
    /// - `ALERT_ERROR_RATE_WARN` / `ALERT_ERROR_RATE_CRIT` - Error rate ceilings
    pub fn from_env() -> Self {
        let defaults = AlertThresholds::default();
        Self {
            store_url: env::var("STORE_URL").ok().filter(|v| !v.is_empty()),
            server_port: env_parse("SERVER_PORT", 3000),
            default_ttl: env_parse("DEFAULT_TTL", 300),
            max_entries: env_parse("MAX_ENTRIES", 10_000),
            compression_enabled: env_flag("COMPRESSION_ENABLED", true),
            metrics_enabled: env_flag("METRICS_ENABLED", true),
            rate_limiting_enabled: env_flag("RATE_LIMITING_ENABLED", true),
            cleanup_interval: env_parse("CLEANUP_INTERVAL", 300),
            sampling_interval: env_parse("SAMPLING_INTERVAL", 30),
            alerts: AlertThresholds {
                hit_rate_warn: env_parse("ALERT_HIT_RATE_WARN", defaults.hit_rate_warn),
                hit_rate_crit: env_parse("ALERT_HIT_RATE_CRIT", defaults.hit_rate_crit),
                latency_warn_ms: env_parse("ALERT_LATENCY_WARN_MS", defaults.latency_warn_ms),
                latency_crit_ms: env_parse("ALERT_LATENCY_CRIT_MS", defaults.latency_crit_ms),
                memory_warn_bytes: env_parse("ALERT_MEMORY_WARN_BYTES", defaults.memory_warn_bytes),
                memory_crit_bytes: env_parse("ALERT_MEMORY_CRIT_BYTES", defaults.memory_crit_bytes),
                error_rate_warn: env_parse("ALERT_ERROR_RATE_WARN", defaults.error_rate_warn),
                error_rate_crit: env_parse("ALERT_ERROR_RATE_CRIT", defaults.error_rate_crit),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: None,
            server_port: 3000,
            default_ttl: 300,
            max_entries: 10_000,
            compression_enabled: true,
            metrics_enabled: true,
            rate_limiting_enabled: true,
            cleanup_interval: 300,
            sampling_interval: 30,
            alerts: AlertThresholds::default(),
        }
    }
}
