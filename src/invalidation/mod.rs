//! Invalidation Module
//!
//! Removes cache entries by tag, glob pattern, age, or explicit dependency
//! edges. Invalidation is advisory: every operation catches store errors,
//! logs, and returns a zero count rather than blocking the caller's primary
//! request path. Consistency is best-effort and eventual.

mod graph;

pub use graph::DependencyGraph;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    current_timestamp_ms, tag_key, CacheEngine, CacheEntry, CLEAR_BATCH, ENTRY_PATTERN,
};
use crate::error::Result;
use crate::store::KeyValueStore;

// == Invalidation Strategy ==
/// One invalidation instruction, dispatchable directly or on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InvalidationStrategy {
    /// Remove every key carrying a tag, optionally cascading one level of
    /// dependency edges
    Tag {
        tag: String,
        #[serde(default)]
        cascade: bool,
    },
    /// Remove every key matching a glob pattern
    Pattern { pattern: String },
    /// Remove entries created more than `older_than_ms` ago
    Time { older_than_ms: u64 },
    /// Remove a key and its direct dependents
    Dependency { parent: String },
}

// == Invalidation Engine ==
/// Tag-, pattern-, time-, and dependency-based cache invalidation.
pub struct InvalidationEngine {
    cache: Arc<CacheEngine>,
    store: Arc<dyn KeyValueStore>,
    graph: DependencyGraph,
    scheduled: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_task_id: AtomicU64,
}

impl InvalidationEngine {
    // == Constructor ==
    pub fn new(cache: Arc<CacheEngine>) -> Self {
        let store = cache.store();
        Self {
            cache,
            store,
            graph: DependencyGraph::new(),
            scheduled: Mutex::new(HashMap::new()),
            next_task_id: AtomicU64::new(1),
        }
    }

    // == Tag Invalidation ==
    /// Deletes every key in the tag's reverse-index set, then the set
    /// itself. With `cascade`, each invalidated key's direct dependents go
    /// too (one level only). Returns the number of keys invalidated.
    pub async fn invalidate_by_tag(&self, tag: &str, cascade: bool) -> u64 {
        match self.invalidate_by_tag_inner(tag, cascade).await {
            Ok(count) => count,
            Err(err) => {
                warn!("Tag invalidation '{}' aborted: {}", tag, err);
                0
            }
        }
    }

    async fn invalidate_by_tag_inner(&self, tag: &str, cascade: bool) -> Result<u64> {
        let set = tag_key(tag);
        let members = self.store.smembers(&set).await?;
        let mut invalidated = 0;
        for key in &members {
            if self.cache.delete(key).await {
                invalidated += 1;
            }
            if cascade {
                for dependent in self.graph.dependents_of(key).await {
                    if self.cache.delete(&dependent).await {
                        invalidated += 1;
                    }
                }
            }
        }
        self.store.del(std::slice::from_ref(&set)).await?;
        debug!("Invalidated {} keys for tag '{}'", invalidated, tag);
        Ok(invalidated)
    }

    // == Pattern Invalidation ==
    /// Deletes every key matching a glob pattern.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> u64 {
        self.cache.clear(pattern).await
    }

    // == Time Invalidation ==
    /// Deletes entries created more than `older_than_ms` ago. Entries whose
    /// envelope cannot be parsed are treated as invalid and deleted.
    ///
    /// Scans the full cache namespace; meant for scheduled runs, never the
    /// per-request path.
    pub async fn invalidate_by_time(&self, older_than_ms: u64) -> u64 {
        match self.invalidate_by_time_inner(older_than_ms).await {
            Ok(count) => count,
            Err(err) => {
                warn!("Time invalidation aborted: {}", err);
                0
            }
        }
    }

    async fn invalidate_by_time_inner(&self, older_than_ms: u64) -> Result<u64> {
        let cutoff = current_timestamp_ms().saturating_sub(older_than_ms);
        let keys = self.store.keys(ENTRY_PATTERN).await?;
        let raws = self.store.mget(&keys).await?;

        let victims: Vec<String> = keys
            .into_iter()
            .zip(raws)
            .filter(|(_, raw)| {
                match raw
                    .as_deref()
                    .and_then(|bytes| serde_json::from_slice::<CacheEntry>(bytes).ok())
                {
                    Some(entry) => entry.created_at < cutoff,
                    None => true,
                }
            })
            .map(|(key, _)| key)
            .collect();

        let mut deleted = 0;
        for batch in victims.chunks(CLEAR_BATCH) {
            deleted += self.store.del(batch).await?;
        }
        Ok(deleted)
    }

    // == Scoped Convenience Wrappers ==
    /// Invalidates the caches owned by a user: profile, context, and
    /// generated responses.
    pub async fn invalidate_user_context(&self, user_id: &str) -> u64 {
        let patterns = [
            format!("user:{}:*", user_id),
            format!("context:user:{}:*", user_id),
            format!("response:user:{}:*", user_id),
        ];
        let mut invalidated = 0;
        for pattern in &patterns {
            invalidated += self.cache.clear(pattern).await;
        }
        invalidated
    }

    /// Invalidates the caches owned by a session: transcriptions and
    /// generated responses.
    pub async fn invalidate_session(&self, session_id: &str) -> u64 {
        let patterns = [
            format!("session:{}:*", session_id),
            format!("transcription:session:{}:*", session_id),
            format!("response:session:{}:*", session_id),
        ];
        let mut invalidated = 0;
        for pattern in &patterns {
            invalidated += self.cache.clear(pattern).await;
        }
        invalidated
    }

    // == Dependency Edges ==
    /// Records that invalidating `parent` should also invalidate `child`.
    pub async fn register_dependency(&self, parent: &str, child: &str) {
        self.graph.register(parent, child).await;
    }

    /// Removes a dependency edge.
    pub async fn remove_dependency(&self, parent: &str, child: &str) {
        self.graph.remove(parent, child).await;
    }

    async fn invalidate_dependency(&self, parent: &str) -> u64 {
        let mut invalidated = 0;
        if self.cache.delete(parent).await {
            invalidated += 1;
        }
        for dependent in self.graph.dependents_of(parent).await {
            if self.cache.delete(&dependent).await {
                invalidated += 1;
            }
        }
        invalidated
    }

    // == Strategy Dispatch ==
    /// Runs one invalidation strategy, returning the invalidated count.
    pub async fn execute_strategy(&self, strategy: &InvalidationStrategy) -> u64 {
        match strategy {
            InvalidationStrategy::Tag { tag, cascade } => {
                self.invalidate_by_tag(tag, *cascade).await
            }
            InvalidationStrategy::Pattern { pattern } => {
                self.invalidate_by_pattern(pattern).await
            }
            InvalidationStrategy::Time { older_than_ms } => {
                self.invalidate_by_time(*older_than_ms).await
            }
            InvalidationStrategy::Dependency { parent } => {
                self.invalidate_dependency(parent).await
            }
        }
    }

    /// Runs a sequence of strategies and sums their counts.
    pub async fn batch_invalidate(&self, strategies: &[InvalidationStrategy]) -> u64 {
        let mut invalidated = 0;
        for strategy in strategies {
            invalidated += self.execute_strategy(strategy).await;
        }
        invalidated
    }

    // == Scheduling ==
    /// Registers a recurring invalidation and returns a handle id usable
    /// with [`cancel_scheduled`](Self::cancel_scheduled).
    ///
    /// Ticks that land while a run is still executing are delayed rather
    /// than stacked, so runs of one schedule never overlap.
    pub fn schedule_invalidation(
        self: &Arc<Self>,
        strategy: InvalidationStrategy,
        interval: Duration,
    ) -> u64 {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the first
            // run happens one full interval from registration.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let invalidated = engine.execute_strategy(&strategy).await;
                debug!(
                    "Scheduled invalidation {:?} removed {} keys",
                    strategy, invalidated
                );
            }
        });
        self.scheduled
            .lock()
            .expect("scheduled task registry poisoned")
            .insert(id, handle);
        id
    }

    /// Cancels a scheduled invalidation. Returns false for unknown ids.
    pub fn cancel_scheduled(&self, id: u64) -> bool {
        match self
            .scheduled
            .lock()
            .expect("scheduled task registry poisoned")
            .remove(&id)
        {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every scheduled invalidation. Called on service shutdown so
    /// timers never outlive the owning instance.
    pub fn shutdown(&self) {
        let mut scheduled = self
            .scheduled
            .lock()
            .expect("scheduled task registry poisoned");
        let count = scheduled.len();
        for (_, handle) in scheduled.drain() {
            handle.abort();
        }
        if count > 0 {
            info!("Cancelled {} scheduled invalidation(s)", count);
        }
    }
}

impl Drop for InvalidationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
