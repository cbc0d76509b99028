//! Sampler Tasks
//!
//! Periodic system metrics sampling and metrics buffer cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::monitor::PerformanceMonitor;

/// Spawns the periodic system sampler: store introspection plus trailing
/// request statistics, appended to the monitor's snapshot ring.
pub fn spawn_system_sampler_task(
    monitor: Arc<PerformanceMonitor>,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting system sampler task with interval of {} seconds",
            interval_secs
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let snapshot = monitor.sample_system_metrics().await;
            debug!(
                "System sample: {:.1} req/s, {:.1} ms avg latency, {} keys",
                snapshot.requests_per_sec, snapshot.avg_latency_ms, snapshot.key_count
            );
        }
    })
}

/// Spawns the metrics buffer cleanup: drops hour-old cache metrics and
/// endpoint aggregates that never saw real traffic.
pub fn spawn_metrics_cleanup_task(
    monitor: Arc<PerformanceMonitor>,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting metrics cleanup task with interval of {} seconds",
            interval_secs
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let (metrics_dropped, endpoints_dropped) = monitor.cleanup().await;
            if metrics_dropped > 0 || endpoints_dropped > 0 {
                info!(
                    "Metrics cleanup: dropped {} metrics, {} endpoint aggregates",
                    metrics_dropped, endpoints_dropped
                );
            }
        }
    })
}
