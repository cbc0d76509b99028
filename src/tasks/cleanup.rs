//! Cache Sweep Task
//!
//! Background task that periodically repairs entries stored without a TTL
//! and prunes tag-set members whose entries no longer exist.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;

/// Spawns the periodic cache sweep.
///
/// Returns a JoinHandle used to abort the task during graceful shutdown.
pub fn spawn_cache_sweep_task(cache: Arc<CacheEngine>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting cache sweep task with interval of {} seconds",
            interval_secs
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let (repaired, pruned) = cache.sweep().await;
            if repaired > 0 || pruned > 0 {
                info!(
                    "Cache sweep: repaired {} TTL-less entries, pruned {} tag members",
                    repaired, pruned
                );
            } else {
                debug!("Cache sweep: nothing to do");
            }
        }
    })
}
