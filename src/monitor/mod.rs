//! Performance Monitor Module
//!
//! Buffers per-operation and per-endpoint metrics in memory, periodically
//! samples store-level system metrics, computes derived statistics, raises
//! threshold alerts, and exports snapshots for scrapers.
//!
//! The monitor is read-only with respect to the cache and rate limiter:
//! both feed it through the record methods, it never calls back into them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::current_timestamp_ms;
use crate::config::AlertThresholds;
use crate::store::{KeyValueStore, StoreInfo};

// == Buffer Bounds ==
/// Soft cap on buffered cache metrics; exceeding it trims to the newest half
const CACHE_METRIC_CAP: usize = 10_000;

/// System snapshot ring size
const SYSTEM_RING_CAP: usize = 120;

/// Store key holding the latest system snapshot for cross-process visibility
const SNAPSHOT_KEY: &str = "monitor:system:latest";

/// TTL on the persisted snapshot
const SNAPSHOT_TTL_MS: u64 = 120_000;

/// Trailing window for requests/sec, latency and error rate
const TRAILING_WINDOW_MS: u64 = 60_000;

/// Cache metrics older than this are dropped by the periodic cleanup
const METRIC_MAX_AGE_MS: u64 = 3_600_000;

/// Endpoint aggregates untouched this long with few requests are noise
const ENDPOINT_STALE_MS: u64 = 86_400_000;
const ENDPOINT_MIN_REQUESTS: u64 = 10;

// == Metric Types ==
/// Cache operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Get,
    Set,
    Delete,
}

impl OperationType {
    fn as_str(&self) -> &'static str {
        match self {
            OperationType::Get => "get",
            OperationType::Set => "set",
            OperationType::Delete => "delete",
        }
    }
}

/// One recorded cache operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetric {
    pub operation: OperationType,
    pub duration_ms: f64,
    pub cache_hit: bool,
    /// Coarse key grouping, not the raw key
    pub key_pattern: String,
    pub timestamp: u64,
    /// Degradation detail (store unavailable, corrupt entry), absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Incremental per-endpoint aggregate.
///
/// The p95/p99 fields are a max-decay approximation carried over from the
/// original system: `p95 = max(p95, latency * 0.95)`. That tracks a decaying
/// ceiling, not a distribution quantile; a streaming estimator such as
/// t-digest would be the correct replacement.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointAggregate {
    pub path: String,
    pub method: String,
    pub count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub last_seen: u64,
    #[serde(skip)]
    total_latency_ms: f64,
}

impl EndpointAggregate {
    fn new(path: &str, method: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            count: 0,
            error_count: 0,
            avg_latency_ms: 0.0,
            max_latency_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            last_seen: 0,
            total_latency_ms: 0.0,
        }
    }

    fn record(&mut self, latency_ms: f64, is_error: bool) {
        self.count += 1;
        if is_error {
            self.error_count += 1;
        }
        self.total_latency_ms += latency_ms;
        self.avg_latency_ms = self.total_latency_ms / self.count as f64;
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);
        self.p95_ms = self.p95_ms.max(latency_ms * 0.95);
        self.p99_ms = self.p99_ms.max(latency_ms * 0.99);
        self.last_seen = current_timestamp_ms();
    }

    fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.count as f64
        }
    }
}

/// Point-in-time system view combining store introspection with trailing
/// request statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: u64,
    pub used_memory_bytes: u64,
    pub connected_clients: u64,
    pub key_count: u64,
    pub requests_per_sec: f64,
    pub avg_latency_ms: f64,
    pub error_rate: f64,
}

/// Rate-limit check counters per rule.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RuleCheckStats {
    pub checks: u64,
    pub denied: u64,
}

// == Alerts ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A threshold breach observed by the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceAlert {
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: AlertSeverity,
    pub message: String,
}

// == Report ==
#[derive(Debug, Clone, Serialize)]
pub struct CacheSection {
    pub hit_rate: f64,
    pub avg_latency_ms: f64,
    pub ops_per_sec: f64,
    /// Operation types by frequency over the recent window
    pub top_operations: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointSection {
    pub slowest: Vec<EndpointAggregate>,
    pub most_used: Vec<EndpointAggregate>,
    pub highest_error_rate: Vec<EndpointAggregate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSection {
    pub current: Option<SystemSnapshot>,
    pub samples: usize,
}

/// Full metrics snapshot assembled on demand.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub cache: CacheSection,
    pub system: SystemSection,
    pub endpoints: EndpointSection,
    pub rate_limits: HashMap<String, RuleCheckStats>,
}

/// Export encodings for [`PerformanceMonitor::export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" => Ok(ExportFormat::Text),
            other => Err(format!("Unknown export format: {}", other)),
        }
    }
}

// == Monitor State ==
#[derive(Default)]
struct MonitorInner {
    cache_metrics: VecDeque<CacheMetric>,
    endpoints: HashMap<String, EndpointAggregate>,
    system: VecDeque<SystemSnapshot>,
    rate_limits: HashMap<String, RuleCheckStats>,
}

// == Performance Monitor ==
/// In-memory metrics hub shared by the cache engine and rate limiter.
pub struct PerformanceMonitor {
    store: Arc<dyn KeyValueStore>,
    thresholds: AlertThresholds,
    enabled: bool,
    inner: RwLock<MonitorInner>,
}

impl PerformanceMonitor {
    /// Creates a monitor reading system metrics from `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, thresholds: AlertThresholds, enabled: bool) -> Self {
        Self {
            store,
            thresholds,
            enabled,
            inner: RwLock::new(MonitorInner::default()),
        }
    }

    // == Recording ==
    /// Appends a cache operation metric, trimming the buffer to its newest
    /// half once the soft cap is exceeded.
    pub async fn record_cache_metric(&self, metric: CacheMetric) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.write().await;
        inner.cache_metrics.push_back(metric);
        if inner.cache_metrics.len() > CACHE_METRIC_CAP {
            let keep = CACHE_METRIC_CAP / 2;
            let drop = inner.cache_metrics.len() - keep;
            inner.cache_metrics.drain(..drop);
        }
    }

    /// Folds one request into the endpoint aggregate for `method path`.
    pub async fn record_endpoint_metric(
        &self,
        path: &str,
        method: &str,
        latency_ms: f64,
        is_error: bool,
    ) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.write().await;
        inner
            .endpoints
            .entry(format!("{} {}", method, path))
            .or_insert_with(|| EndpointAggregate::new(path, method))
            .record(latency_ms, is_error);
    }

    /// Counts a rate-limit decision against its rule.
    pub async fn record_rate_limit(&self, rule_id: &str, allowed: bool) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.write().await;
        let stats = inner.rate_limits.entry(rule_id.to_string()).or_default();
        stats.checks += 1;
        if !allowed {
            stats.denied += 1;
        }
    }

    /// Clones the newest `n` buffered cache metrics.
    pub async fn recent_cache_metrics(&self, n: usize) -> Vec<CacheMetric> {
        let inner = self.inner.read().await;
        let len = inner.cache_metrics.len();
        inner
            .cache_metrics
            .iter()
            .skip(len.saturating_sub(n))
            .cloned()
            .collect()
    }

    // == System Sampling ==
    /// Takes one system sample: store introspection plus trailing-window
    /// request statistics. The latest snapshot is persisted back into the
    /// store under a short TTL so other instances can read it.
    pub async fn sample_system_metrics(&self) -> SystemSnapshot {
        let info = match self.store.info().await {
            Ok(info) => info,
            Err(err) => {
                warn!("System sample could not read store info: {}", err);
                StoreInfo::default()
            }
        };

        let now = current_timestamp_ms();
        let snapshot = {
            let mut inner = self.inner.write().await;
            let cutoff = now.saturating_sub(TRAILING_WINDOW_MS);
            let recent: Vec<&CacheMetric> = inner
                .cache_metrics
                .iter()
                .filter(|m| m.timestamp >= cutoff)
                .collect();
            let count = recent.len();
            let avg_latency_ms = if count == 0 {
                0.0
            } else {
                recent.iter().map(|m| m.duration_ms).sum::<f64>() / count as f64
            };
            let errors = recent.iter().filter(|m| m.metadata.is_some()).count();
            let error_rate = if count == 0 {
                0.0
            } else {
                errors as f64 / count as f64
            };
            let snapshot = SystemSnapshot {
                timestamp: now,
                used_memory_bytes: info.used_memory_bytes,
                connected_clients: info.connected_clients,
                key_count: info.key_count,
                requests_per_sec: count as f64 / (TRAILING_WINDOW_MS as f64 / 1000.0),
                avg_latency_ms,
                error_rate,
            };
            inner.system.push_back(snapshot.clone());
            if inner.system.len() > SYSTEM_RING_CAP {
                inner.system.pop_front();
            }
            snapshot
        };

        // Best-effort cross-process visibility.
        if let Ok(bytes) = serde_json::to_vec(&snapshot) {
            if let Err(err) = self.store.set(SNAPSHOT_KEY, &bytes, Some(SNAPSHOT_TTL_MS)).await {
                debug!("Could not persist system snapshot: {}", err);
            }
        }

        snapshot
    }

    // == Reporting ==
    /// Assembles the full metrics snapshot.
    pub async fn report(&self) -> PerformanceReport {
        let inner = self.inner.read().await;

        let window: Vec<&CacheMetric> = {
            let len = inner.cache_metrics.len();
            inner
                .cache_metrics
                .iter()
                .skip(len.saturating_sub(crate::cache::STATS_METRIC_WINDOW))
                .collect()
        };
        let gets: Vec<&&CacheMetric> = window
            .iter()
            .filter(|m| m.operation == OperationType::Get)
            .collect();
        let hits = gets.iter().filter(|m| m.cache_hit).count();
        let hit_rate = if gets.is_empty() {
            0.0
        } else {
            hits as f64 / gets.len() as f64
        };
        let avg_latency_ms = if window.is_empty() {
            0.0
        } else {
            window.iter().map(|m| m.duration_ms).sum::<f64>() / window.len() as f64
        };
        let ops_per_sec = {
            let now = current_timestamp_ms();
            let cutoff = now.saturating_sub(TRAILING_WINDOW_MS);
            let recent = inner
                .cache_metrics
                .iter()
                .filter(|m| m.timestamp >= cutoff)
                .count();
            recent as f64 / (TRAILING_WINDOW_MS as f64 / 1000.0)
        };
        let mut op_counts: HashMap<&'static str, u64> = HashMap::new();
        for m in &window {
            *op_counts.entry(m.operation.as_str()).or_default() += 1;
        }
        let mut top_operations: Vec<(String, u64)> = op_counts
            .into_iter()
            .map(|(op, n)| (op.to_string(), n))
            .collect();
        top_operations.sort_by(|a, b| b.1.cmp(&a.1));

        let mut by_latency: Vec<EndpointAggregate> = inner.endpoints.values().cloned().collect();
        by_latency.sort_by(|a, b| b.avg_latency_ms.total_cmp(&a.avg_latency_ms));
        let mut by_count = by_latency.clone();
        by_count.sort_by(|a, b| b.count.cmp(&a.count));
        let mut by_errors = by_latency.clone();
        by_errors.sort_by(|a, b| b.error_rate().total_cmp(&a.error_rate()));

        PerformanceReport {
            cache: CacheSection {
                hit_rate,
                avg_latency_ms,
                ops_per_sec,
                top_operations,
            },
            system: SystemSection {
                current: inner.system.back().cloned(),
                samples: inner.system.len(),
            },
            endpoints: EndpointSection {
                slowest: by_latency.into_iter().take(5).collect(),
                most_used: by_count.into_iter().take(5).collect(),
                highest_error_rate: by_errors.into_iter().take(5).collect(),
            },
            rate_limits: inner.rate_limits.clone(),
        }
    }

    // == Alerting ==
    /// Evaluates the configured thresholds against current statistics.
    pub async fn alerts(&self) -> Vec<PerformanceAlert> {
        let report = self.report().await;
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        let has_gets = report.cache.top_operations.iter().any(|(op, _)| op == "get");
        if has_gets && report.cache.hit_rate < t.hit_rate_warn {
            let severity = if report.cache.hit_rate < t.hit_rate_crit {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            alerts.push(PerformanceAlert {
                metric: "cache_hit_rate".into(),
                value: report.cache.hit_rate,
                threshold: t.hit_rate_warn,
                severity,
                message: format!(
                    "Cache hit rate {:.1}% below {:.0}% floor",
                    report.cache.hit_rate * 100.0,
                    t.hit_rate_warn * 100.0
                ),
            });
        }

        if report.cache.avg_latency_ms > t.latency_warn_ms {
            let severity = if report.cache.avg_latency_ms > t.latency_crit_ms {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            alerts.push(PerformanceAlert {
                metric: "cache_avg_latency_ms".into(),
                value: report.cache.avg_latency_ms,
                threshold: t.latency_warn_ms,
                severity,
                message: format!(
                    "Average cache latency {:.1} ms above {:.0} ms ceiling",
                    report.cache.avg_latency_ms, t.latency_warn_ms
                ),
            });
        }

        if let Some(current) = &report.system.current {
            if current.used_memory_bytes > t.memory_warn_bytes {
                let severity = if current.used_memory_bytes > t.memory_crit_bytes {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                alerts.push(PerformanceAlert {
                    metric: "store_memory_bytes".into(),
                    value: current.used_memory_bytes as f64,
                    threshold: t.memory_warn_bytes as f64,
                    severity,
                    message: format!(
                        "Store memory {} MiB above {} MiB ceiling",
                        current.used_memory_bytes / (1024 * 1024),
                        t.memory_warn_bytes / (1024 * 1024)
                    ),
                });
            }
        }

        let (requests, errors) = report
            .endpoints
            .most_used
            .iter()
            .fold((0u64, 0u64), |(r, e), ep| (r + ep.count, e + ep.error_count));
        if requests > 0 {
            let error_rate = errors as f64 / requests as f64;
            if error_rate > t.error_rate_warn {
                let severity = if error_rate > t.error_rate_crit {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                alerts.push(PerformanceAlert {
                    metric: "error_rate".into(),
                    value: error_rate,
                    threshold: t.error_rate_warn,
                    severity,
                    message: format!(
                        "Error rate {:.1}% above {:.0}% ceiling",
                        error_rate * 100.0,
                        t.error_rate_warn * 100.0
                    ),
                });
            }
        }

        alerts
    }

    // == Export ==
    /// Serializes the full snapshot as JSON or as flat `name value` lines
    /// for pull-based scrapers.
    pub async fn export(&self, format: ExportFormat) -> String {
        let report = self.report().await;
        match format {
            ExportFormat::Json => {
                serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
            }
            ExportFormat::Text => {
                let mut out = String::new();
                out.push_str(&format!("cachegate_hit_rate {}\n", report.cache.hit_rate));
                out.push_str(&format!(
                    "cachegate_avg_latency_ms {}\n",
                    report.cache.avg_latency_ms
                ));
                out.push_str(&format!(
                    "cachegate_ops_per_sec {}\n",
                    report.cache.ops_per_sec
                ));
                if let Some(sys) = &report.system.current {
                    out.push_str(&format!(
                        "cachegate_store_memory_bytes {}\n",
                        sys.used_memory_bytes
                    ));
                    out.push_str(&format!(
                        "cachegate_store_connected_clients {}\n",
                        sys.connected_clients
                    ));
                    out.push_str(&format!("cachegate_store_key_count {}\n", sys.key_count));
                    out.push_str(&format!("cachegate_error_rate {}\n", sys.error_rate));
                }
                for ep in &report.endpoints.most_used {
                    out.push_str(&format!(
                        "cachegate_endpoint_requests{{endpoint=\"{} {}\"}} {}\n",
                        ep.method, ep.path, ep.count
                    ));
                }
                for (rule, stats) in &report.rate_limits {
                    out.push_str(&format!(
                        "cachegate_rate_limit_denied{{rule=\"{}\"}} {}\n",
                        rule, stats.denied
                    ));
                }
                out
            }
        }
    }

    // == Cleanup ==
    /// Drops aged cache metrics and noise endpoint aggregates.
    /// Returns (metrics dropped, endpoints dropped).
    pub async fn cleanup(&self) -> (usize, usize) {
        let now = current_timestamp_ms();
        let mut inner = self.inner.write().await;

        let before = inner.cache_metrics.len();
        let cutoff = now.saturating_sub(METRIC_MAX_AGE_MS);
        inner.cache_metrics.retain(|m| m.timestamp >= cutoff);
        let metrics_dropped = before - inner.cache_metrics.len();

        let endpoint_cutoff = now.saturating_sub(ENDPOINT_STALE_MS);
        let before = inner.endpoints.len();
        inner
            .endpoints
            .retain(|_, ep| ep.last_seen >= endpoint_cutoff || ep.count >= ENDPOINT_MIN_REQUESTS);
        let endpoints_dropped = before - inner.endpoints.len();

        (metrics_dropped, endpoints_dropped)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(
            Arc::new(MemoryStore::new()),
            AlertThresholds::default(),
            true,
        )
    }

    fn metric(operation: OperationType, hit: bool, duration_ms: f64) -> CacheMetric {
        CacheMetric {
            operation,
            duration_ms,
            cache_hit: hit,
            key_pattern: "test".into(),
            timestamp: current_timestamp_ms(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_buffer_trims_to_newest_half() {
        let mon = monitor();
        for _ in 0..CACHE_METRIC_CAP + 1 {
            mon.record_cache_metric(metric(OperationType::Get, true, 1.0))
                .await;
        }
        let inner = mon.inner.read().await;
        assert_eq!(inner.cache_metrics.len(), CACHE_METRIC_CAP / 2);
    }

    #[tokio::test]
    async fn test_hit_rate_over_get_operations() {
        let mon = monitor();
        for _ in 0..8 {
            mon.record_cache_metric(metric(OperationType::Get, true, 1.0))
                .await;
        }
        for _ in 0..2 {
            mon.record_cache_metric(metric(OperationType::Get, false, 1.0))
                .await;
        }
        // Set operations must not dilute the hit rate.
        mon.record_cache_metric(metric(OperationType::Set, false, 1.0))
            .await;
        let report = mon.report().await;
        assert!((report.cache.hit_rate - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_endpoint_aggregate_running_stats() {
        let mon = monitor();
        mon.record_endpoint_metric("/x", "GET", 10.0, false).await;
        mon.record_endpoint_metric("/x", "GET", 30.0, true).await;
        let report = mon.report().await;
        let ep = &report.endpoints.most_used[0];
        assert_eq!(ep.count, 2);
        assert_eq!(ep.error_count, 1);
        assert!((ep.avg_latency_ms - 20.0).abs() < 1e-9);
        assert_eq!(ep.max_latency_ms, 30.0);
        // Max-decay approximation, not a real percentile.
        assert!((ep.p95_ms - 28.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_system_sample_persists_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let mon = PerformanceMonitor::new(store.clone(), AlertThresholds::default(), true);
        mon.record_cache_metric(metric(OperationType::Get, true, 5.0))
            .await;
        let snapshot = mon.sample_system_metrics().await;
        assert!(snapshot.requests_per_sec > 0.0);

        use crate::store::KeyValueStore;
        let stored = store.get(SNAPSHOT_KEY).await.unwrap().unwrap();
        let parsed: SystemSnapshot = serde_json::from_slice(&stored).unwrap();
        assert_eq!(parsed.timestamp, snapshot.timestamp);
    }

    #[tokio::test]
    async fn test_low_hit_rate_raises_alert() {
        let mon = monitor();
        for _ in 0..10 {
            mon.record_cache_metric(metric(OperationType::Get, false, 1.0))
                .await;
        }
        let alerts = mon.alerts().await;
        let hit = alerts
            .iter()
            .find(|a| a.metric == "cache_hit_rate")
            .expect("hit rate alert");
        assert_eq!(hit.severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_no_alerts_without_traffic() {
        let mon = monitor();
        assert!(mon.alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_latency_alert_severity() {
        let mon = monitor();
        for _ in 0..5 {
            mon.record_cache_metric(metric(OperationType::Get, true, 150.0))
                .await;
        }
        let alerts = mon.alerts().await;
        let latency = alerts
            .iter()
            .find(|a| a.metric == "cache_avg_latency_ms")
            .expect("latency alert");
        assert_eq!(latency.severity, AlertSeverity::Warning);
    }

    #[tokio::test]
    async fn test_export_text_lines() {
        let mon = monitor();
        mon.record_cache_metric(metric(OperationType::Get, true, 1.0))
            .await;
        mon.record_rate_limit("auth-login", false).await;
        let text = mon.export(ExportFormat::Text).await;
        assert!(text.contains("cachegate_hit_rate 1"));
        assert!(text.contains("cachegate_rate_limit_denied{rule=\"auth-login\"} 1"));
    }

    #[tokio::test]
    async fn test_export_json_parses() {
        let mon = monitor();
        mon.record_cache_metric(metric(OperationType::Set, false, 2.0))
            .await;
        let json = mon.export(ExportFormat::Json).await;
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get("cache").is_some());
    }

    #[tokio::test]
    async fn test_cleanup_drops_old_metrics_and_noise_endpoints() {
        let mon = monitor();
        let mut old = metric(OperationType::Get, true, 1.0);
        old.timestamp = current_timestamp_ms() - METRIC_MAX_AGE_MS - 1000;
        mon.record_cache_metric(old).await;
        mon.record_cache_metric(metric(OperationType::Get, true, 1.0))
            .await;

        // A stale endpoint with under ten requests is noise.
        mon.record_endpoint_metric("/stale", "GET", 1.0, false).await;
        {
            let mut inner = mon.inner.write().await;
            inner.endpoints.get_mut("GET /stale").unwrap().last_seen =
                current_timestamp_ms() - ENDPOINT_STALE_MS - 1000;
        }

        let (metrics_dropped, endpoints_dropped) = mon.cleanup().await;
        assert_eq!(metrics_dropped, 1);
        assert_eq!(endpoints_dropped, 1);
    }

    #[tokio::test]
    async fn test_disabled_monitor_records_nothing() {
        let mon = PerformanceMonitor::new(
            Arc::new(MemoryStore::new()),
            AlertThresholds::default(),
            false,
        );
        mon.record_cache_metric(metric(OperationType::Get, true, 1.0))
            .await;
        mon.record_endpoint_metric("/x", "GET", 1.0, false).await;
        let report = mon.report().await;
        assert_eq!(report.cache.top_operations.len(), 0);
        assert!(report.endpoints.most_used.is_empty());
    }
}
