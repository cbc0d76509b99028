//! Cache Engine Module
//!
//! Serializes opaque JSON payloads into store envelopes, compresses large
//! payloads, maintains the tag reverse index, and keeps the total entry
//! count under the configured ceiling with a sampled eviction pass.
//!
//! Public operations never propagate store failures into the caller's
//! request path: a failed read degrades to a miss, a failed write to a
//! no-op, and the cause is recorded on the emitted metric instead.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{
    current_timestamp_ms, entry_key, key_pattern, tag_key, CacheEntry, CLEAR_BATCH,
    COMPRESSION_THRESHOLD, ENTRY_PATTERN, ENTRY_PREFIX, EVICTION_SAMPLE, STATS_METRIC_WINDOW,
    TAG_PATTERN, TOP_KEY_SAMPLE, WARMUP_BATCH,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::monitor::{CacheMetric, OperationType, PerformanceMonitor};
use crate::store::{KeyTtl, KeyValueStore};

// == Warmup Entry ==
/// One entry of a bulk pre-population request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupEntry {
    pub key: String,
    pub value: Value,
    /// TTL in seconds; the default TTL applies when absent
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// == Stats Report ==
/// A key and how often it has been read, for the top-hit list.
#[derive(Debug, Clone, Serialize)]
pub struct TopKey {
    pub key: String,
    pub hit_count: u64,
}

/// Aggregate cache statistics.
///
/// Hit rate and latency come from the most recent buffered metrics, and the
/// top-key list from a bounded key sample; both are approximations, not
/// full scans.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStatsReport {
    pub total_keys: u64,
    pub estimated_memory_bytes: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub avg_latency_ms: f64,
    pub top_keys: Vec<TopKey>,
}

// == Cache Engine ==
/// Main cache engine over the shared key-value store.
pub struct CacheEngine {
    store: Arc<dyn KeyValueStore>,
    monitor: Arc<PerformanceMonitor>,
    default_ttl_ms: u64,
    max_entries: usize,
    compression_enabled: bool,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates a new engine backed by `store`, reporting to `monitor`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        monitor: Arc<PerformanceMonitor>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            monitor,
            default_ttl_ms: config.default_ttl * 1000,
            max_entries: config.max_entries,
            compression_enabled: config.compression_enabled,
        }
    }

    /// Store handle, shared with the invalidation engine.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are deleted and reported as a miss; so are corrupt
    /// ones. A successful read increments the entry's hit count and
    /// re-persists it with its remaining TTL.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let started = Instant::now();
        let (value, detail) = match self.get_inner(key).await {
            Ok(v) => (v, None),
            Err(err) => {
                warn!("Cache get '{}' degraded to miss: {}", key, err);
                (None, Some(err.to_string()))
            }
        };
        self.emit(OperationType::Get, key, started, value.is_some(), detail)
            .await;
        value
    }

    async fn get_inner(&self, key: &str) -> Result<Option<Value>> {
        let skey = entry_key(key);
        let Some(raw) = self.store.get(&skey).await? else {
            return Ok(None);
        };
        let mut entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                // Corrupt envelope: drop it so the next read is a clean miss.
                self.store.del(std::slice::from_ref(&skey)).await.ok();
                return Err(CacheError::Serialization(err.to_string()));
            }
        };
        if entry.is_expired() {
            self.store.del(std::slice::from_ref(&skey)).await?;
            return Ok(None);
        }
        let value = match decode_payload(&entry) {
            Ok(value) => value,
            Err(err) => {
                self.store.del(std::slice::from_ref(&skey)).await.ok();
                return Err(err);
            }
        };
        entry.record_hit();
        let remaining = entry.remaining_ttl_ms();
        let envelope = serde_json::to_vec(&entry)?;
        self.store.set(&skey, &envelope, Some(remaining)).await?;
        Ok(Some(value))
    }

    // == Set ==
    /// Stores a value with an optional TTL in seconds and tags.
    ///
    /// Payloads above the compression threshold are gzip-compressed when
    /// that actually shrinks them. Tagged keys are added to each tag's
    /// reverse-index set, whose TTL is extended to twice the entry TTL.
    /// Returns false when the write was dropped because the store failed.
    pub async fn set(&self, key: &str, value: &Value, ttl: Option<u64>, tags: &[String]) -> bool {
        let started = Instant::now();
        let (stored, detail) = match self.set_inner(key, value, ttl, tags).await {
            Ok(()) => (true, None),
            Err(err) => {
                warn!("Cache set '{}' dropped: {}", key, err);
                (false, Some(err.to_string()))
            }
        };
        self.emit(OperationType::Set, key, started, false, detail).await;
        if stored {
            // Opportunistic size maintenance; bounded sample, never fatal.
            if let Err(err) = self.evict_if_over_capacity().await {
                debug!("Eviction pass skipped: {}", err);
            }
        }
        stored
    }

    async fn set_inner(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<u64>,
        tags: &[String],
    ) -> Result<()> {
        let ttl_ms = ttl.map(|secs| secs * 1000).unwrap_or(self.default_ttl_ms);
        let payload = serde_json::to_vec(value)?;
        let mut entry = CacheEntry::new(key.to_string(), payload, ttl_ms, tags.to_vec());
        if self.compression_enabled && entry.raw_size as usize > COMPRESSION_THRESHOLD {
            entry.apply_compression(gzip_compress(&entry.payload)?);
        }
        let envelope = serde_json::to_vec(&entry)?;
        self.store
            .set(&entry_key(key), &envelope, Some(ttl_ms))
            .await?;
        for tag in &entry.tags {
            let set = tag_key(tag);
            self.store.sadd(&set, key).await?;
            self.store.expire(&set, ttl_ms * 2).await?;
        }
        Ok(())
    }

    // == Batch Variants ==
    /// Reads many keys at once, mapping every requested key to its value or
    /// absence. A store error degrades the entire batch to all-absent.
    pub async fn mget(&self, keys: &[String]) -> Vec<(String, Option<Value>)> {
        let started = Instant::now();
        let (results, detail) = match self.mget_inner(keys).await {
            Ok(results) => (results, None),
            Err(err) => {
                warn!("Cache mget of {} keys degraded to all-absent: {}", keys.len(), err);
                (
                    keys.iter().map(|k| (k.clone(), None)).collect(),
                    Some(err.to_string()),
                )
            }
        };
        let hits = results.iter().filter(|(_, v)| v.is_some()).count();
        let all_hit = !results.is_empty() && hits == results.len();
        if let Some(first) = keys.first() {
            self.emit(OperationType::Get, first, started, all_hit, detail)
                .await;
        }
        results
    }

    async fn mget_inner(&self, keys: &[String]) -> Result<Vec<(String, Option<Value>)>> {
        let store_keys: Vec<String> = keys.iter().map(|k| entry_key(k)).collect();
        let raws = self.store.mget(&store_keys).await?;
        let mut out = Vec::with_capacity(keys.len());
        for (key, raw) in keys.iter().zip(raws) {
            let value = raw
                .and_then(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).ok())
                .filter(|entry| !entry.is_expired())
                .and_then(|entry| decode_payload(&entry).ok());
            out.push((key.clone(), value));
        }
        Ok(out)
    }

    /// Writes a batch of entries; returns how many were stored.
    pub async fn mset(&self, entries: &[WarmupEntry]) -> usize {
        let mut stored = 0;
        for entry in entries {
            if self
                .set(&entry.key, &entry.value, entry.ttl, &entry.tags)
                .await
            {
                stored += 1;
            }
        }
        stored
    }

    // == Delete ==
    /// Removes an entry and best-effort removes its key from every tag set.
    ///
    /// The tag cleanup walks all tag sets, an O(tags-in-system) scan.
    pub async fn delete(&self, key: &str) -> bool {
        let started = Instant::now();
        let (existed, detail) = match self.delete_inner(key).await {
            Ok(existed) => (existed, None),
            Err(err) => {
                warn!("Cache delete '{}' degraded to no-op: {}", key, err);
                (false, Some(err.to_string()))
            }
        };
        self.emit(OperationType::Delete, key, started, false, detail)
            .await;
        existed
    }

    async fn delete_inner(&self, key: &str) -> Result<bool> {
        let removed = self.store.del(&[entry_key(key)]).await?;
        for set in self.store.keys(TAG_PATTERN).await? {
            self.store.srem(&set, key).await?;
        }
        Ok(removed > 0)
    }

    // == Clear ==
    /// Deletes all keys matching a glob pattern in bounded batches.
    /// Returns the number of keys deleted.
    pub async fn clear(&self, pattern: &str) -> u64 {
        let started = Instant::now();
        let (deleted, detail) = match self.clear_inner(pattern).await {
            Ok(deleted) => (deleted, None),
            Err(err) => {
                warn!("Cache clear '{}' degraded to no-op: {}", pattern, err);
                (0, Some(err.to_string()))
            }
        };
        self.emit(OperationType::Delete, pattern, started, false, detail)
            .await;
        deleted
    }

    async fn clear_inner(&self, pattern: &str) -> Result<u64> {
        let keys = self
            .store
            .keys(&format!("{}{}", ENTRY_PREFIX, pattern))
            .await?;
        let mut deleted = 0;
        for batch in keys.chunks(CLEAR_BATCH) {
            deleted += self.store.del(batch).await?;
        }
        Ok(deleted)
    }

    // == Stats ==
    /// Aggregate statistics; every figure degrades to zero when the store
    /// is unreachable.
    pub async fn get_stats(&self) -> CacheStatsReport {
        match self.get_stats_inner().await {
            Ok(report) => report,
            Err(err) => {
                warn!("Cache stats degraded to defaults: {}", err);
                CacheStatsReport::default()
            }
        }
    }

    async fn get_stats_inner(&self) -> Result<CacheStatsReport> {
        let entry_keys = self.store.keys(ENTRY_PATTERN).await?;
        let info = self.store.info().await.unwrap_or_default();

        let metrics = self.monitor.recent_cache_metrics(STATS_METRIC_WINDOW).await;
        let gets: Vec<_> = metrics
            .iter()
            .filter(|m| m.operation == OperationType::Get)
            .collect();
        let hits = gets.iter().filter(|m| m.cache_hit).count();
        let hit_rate = if gets.is_empty() {
            0.0
        } else {
            hits as f64 / gets.len() as f64
        };
        let avg_latency_ms = if metrics.is_empty() {
            0.0
        } else {
            metrics.iter().map(|m| m.duration_ms).sum::<f64>() / metrics.len() as f64
        };

        // Top keys over a bounded sample, approximate by design.
        let sample: Vec<String> = entry_keys.iter().take(TOP_KEY_SAMPLE).cloned().collect();
        let raws = self.store.mget(&sample).await?;
        let mut top: Vec<TopKey> = raws
            .into_iter()
            .flatten()
            .filter_map(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).ok())
            .map(|entry| TopKey {
                key: entry.key,
                hit_count: entry.hit_count,
            })
            .collect();
        top.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));
        top.truncate(10);

        Ok(CacheStatsReport {
            total_keys: entry_keys.len() as u64,
            estimated_memory_bytes: info.used_memory_bytes,
            hit_rate,
            miss_rate: 1.0 - hit_rate,
            avg_latency_ms,
            top_keys: top,
        })
    }

    // == Warmup ==
    /// Bulk pre-population in bounded batches; returns entries stored.
    pub async fn warmup(&self, entries: &[WarmupEntry]) -> usize {
        let mut stored = 0;
        for batch in entries.chunks(WARMUP_BATCH) {
            stored += self.mset(batch).await;
            debug!("Warmup batch of {} entries written", batch.len());
        }
        stored
    }

    // == Eviction ==
    /// Approximate LRU/LFU hybrid over a bounded sample: once the entry
    /// count exceeds the maximum, the least-hit and oldest sampled entries
    /// are deleted until the count fits again.
    async fn evict_if_over_capacity(&self) -> Result<u64> {
        let all = self.store.keys(ENTRY_PATTERN).await?;
        if all.len() <= self.max_entries {
            return Ok(0);
        }
        let surplus = all.len() - self.max_entries;
        let sample: Vec<String> = all.into_iter().take(EVICTION_SAMPLE).collect();
        let raws = self.store.mget(&sample).await?;

        let mut candidates: Vec<(u64, u64, String)> = sample
            .iter()
            .zip(raws)
            .map(|(skey, raw)| {
                match raw.and_then(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).ok()) {
                    Some(entry) => (entry.hit_count, entry.created_at, skey.clone()),
                    // Unreadable entries sort first and go out with the surplus.
                    None => (0, 0, skey.clone()),
                }
            })
            .collect();
        candidates.sort();

        let victims: Vec<String> = candidates
            .into_iter()
            .take(surplus)
            .map(|(_, _, skey)| skey)
            .collect();
        let evicted = self.store.del(&victims).await?;
        if evicted > 0 {
            debug!("Evicted {} entries over capacity", evicted);
        }
        Ok(evicted)
    }

    // == Periodic Sweep ==
    /// Background maintenance: gives the default TTL to entries stored
    /// without one and prunes tag-set members whose entries are gone.
    /// Returns (entries repaired, tag members pruned).
    pub async fn sweep(&self) -> (u64, u64) {
        match self.sweep_inner().await {
            Ok(counts) => counts,
            Err(err) => {
                warn!("Cache sweep aborted: {}", err);
                (0, 0)
            }
        }
    }

    async fn sweep_inner(&self) -> Result<(u64, u64)> {
        let mut repaired = 0;
        for skey in self.store.keys(ENTRY_PATTERN).await? {
            if self.store.ttl(&skey).await? == KeyTtl::NoExpiry {
                self.store.expire(&skey, self.default_ttl_ms).await?;
                repaired += 1;
            }
        }

        let mut pruned = 0;
        for set in self.store.keys(TAG_PATTERN).await? {
            for member in self.store.smembers(&set).await? {
                if !self.store.exists(&entry_key(&member)).await? {
                    self.store.srem(&set, &member).await?;
                    pruned += 1;
                }
            }
            if self.store.smembers(&set).await?.is_empty() {
                self.store.del(std::slice::from_ref(&set)).await?;
            }
        }
        Ok((repaired, pruned))
    }

    // == Metric Emission ==
    async fn emit(
        &self,
        operation: OperationType,
        key: &str,
        started: Instant,
        cache_hit: bool,
        metadata: Option<String>,
    ) {
        self.monitor
            .record_cache_metric(CacheMetric {
                operation,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                cache_hit,
                key_pattern: key_pattern(key),
                timestamp: current_timestamp_ms(),
                metadata,
            })
            .await;
    }
}

// == Compression Helpers ==
fn gzip_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| CacheError::Serialization(format!("Compression failed: {}", e)))
}

fn gzip_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Serialization(format!("Decompression failed: {}", e)))?;
    Ok(out)
}

fn decode_payload(entry: &CacheEntry) -> Result<Value> {
    if entry.compressed {
        let raw = gzip_decompress(&entry.payload)?;
        Ok(serde_json::from_slice(&raw)?)
    } else {
        Ok(serde_json::from_slice(&entry.payload)?)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertThresholds;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn engine_with(max_entries: usize) -> (CacheEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let monitor = Arc::new(PerformanceMonitor::new(
            store.clone(),
            AlertThresholds::default(),
            true,
        ));
        let config = Config {
            max_entries,
            ..Config::default()
        };
        (CacheEngine::new(store.clone(), monitor, &config), store)
    }

    fn engine() -> (CacheEngine, Arc<MemoryStore>) {
        engine_with(10_000)
    }

    async fn stored_entry(store: &MemoryStore, key: &str) -> Option<CacheEntry> {
        store
            .get(&entry_key(key))
            .await
            .unwrap()
            .map(|bytes| serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_roundtrip_small_value() {
        let (cache, _) = engine();
        let value = json!({"text": "hi"});
        assert!(cache.set("q1", &value, Some(60), &[]).await);
        assert_eq!(cache.get("q1").await, Some(value));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (cache, _) = engine();
        assert_eq!(cache.get("nope").await, None);
    }

    #[tokio::test]
    async fn test_small_payload_stored_uncompressed() {
        let (cache, store) = engine();
        let value = json!("short");
        cache.set("k", &value, None, &[]).await;
        let entry = stored_entry(&store, "k").await.unwrap();
        assert!(!entry.compressed);
        assert_eq!(entry.compressed_size, None);
    }

    #[tokio::test]
    async fn test_large_payload_compressed_and_roundtrips() {
        let (cache, store) = engine();
        let value = json!({ "answer": "x".repeat(4096) });
        cache.set("big", &value, None, &[]).await;
        let entry = stored_entry(&store, "big").await.unwrap();
        assert!(entry.compressed);
        assert!(entry.raw_size as usize > COMPRESSION_THRESHOLD);
        assert!(entry.compressed_size.unwrap() <= entry.raw_size);
        assert_eq!(cache.get("big").await, Some(value));
    }

    #[tokio::test]
    async fn test_hit_increments_count_and_keeps_remaining_ttl() {
        let (cache, store) = engine();
        cache.set("q1", &json!({"text": "hi"}), Some(60), &[]).await;
        assert!(cache.get("q1").await.is_some());
        let entry = stored_entry(&store, "q1").await.unwrap();
        assert_eq!(entry.hit_count, 1);
        // Re-persisted with the remaining TTL, not the original.
        match store.ttl(&entry_key("q1")).await.unwrap() {
            KeyTtl::Remaining(ms) => assert!(ms <= 60_000),
            other => panic!("unexpected ttl {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_entry_deleted_on_read() {
        let (cache, store) = engine();
        // Write an envelope whose logical expiry has already passed but
        // whose store TTL has not.
        let mut entry = CacheEntry::new("old".into(), b"\"v\"".to_vec(), 1, vec![]);
        entry.expires_at = entry.created_at;
        let bytes = serde_json::to_vec(&entry).unwrap();
        store
            .set(&entry_key("old"), &bytes, Some(60_000))
            .await
            .unwrap();

        assert_eq!(cache.get("old").await, None);
        assert!(stored_entry(&store, "old").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_deleted_and_missed() {
        let (cache, store) = engine();
        store
            .set(&entry_key("bad"), b"{not an envelope", Some(60_000))
            .await
            .unwrap();
        assert_eq!(cache.get("bad").await, None);
        assert!(stored_entry(&store, "bad").await.is_none());
    }

    #[tokio::test]
    async fn test_tags_indexed_with_doubled_ttl() {
        let (cache, store) = engine();
        cache
            .set("q1", &json!(1), Some(60), &["user:42".to_string()])
            .await;
        let members = store.smembers(&tag_key("user:42")).await.unwrap();
        assert_eq!(members, vec!["q1"]);
        match store.ttl(&tag_key("user:42")).await.unwrap() {
            KeyTtl::Remaining(ms) => assert!(ms > 60_000 && ms <= 120_000),
            other => panic!("unexpected ttl {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_removes_entry_and_tag_membership() {
        let (cache, store) = engine();
        cache
            .set("q1", &json!(1), Some(60), &["user:42".to_string()])
            .await;
        assert!(cache.delete("q1").await);
        assert_eq!(cache.get("q1").await, None);
        assert!(!store
            .sismember(&tag_key("user:42"), "q1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_returns_false() {
        let (cache, _) = engine();
        assert!(!cache.delete("ghost").await);
    }

    #[tokio::test]
    async fn test_mget_maps_every_requested_key() {
        let (cache, _) = engine();
        cache.set("a", &json!(1), None, &[]).await;
        cache.set("c", &json!(3), None, &[]).await;
        let got = cache
            .mget(&["a".into(), "b".into(), "c".into()])
            .await;
        assert_eq!(got.len(), 3);
        assert_eq!(got[0], ("a".into(), Some(json!(1))));
        assert_eq!(got[1], ("b".into(), None));
        assert_eq!(got[2], ("c".into(), Some(json!(3))));
    }

    #[tokio::test]
    async fn test_clear_by_pattern_counts_deletions() {
        let (cache, _) = engine();
        for i in 0..5 {
            cache
                .set(&format!("user:42:item:{}", i), &json!(i), None, &[])
                .await;
        }
        cache.set("user:7:item:0", &json!(0), None, &[]).await;
        assert_eq!(cache.clear("user:42:*").await, 5);
        assert!(cache.get("user:7:item:0").await.is_some());
    }

    #[tokio::test]
    async fn test_eviction_bound_prefers_low_hit_count() {
        let (cache, store) = engine_with(5);
        for i in 0..5 {
            cache.set(&format!("k{}", i), &json!(i), None, &[]).await;
        }
        // Make k0..k3 popular; k4 stays cold.
        for i in 0..4 {
            cache.get(&format!("k{}", i)).await;
        }
        // The sixth write pushes the count over the ceiling.
        cache.set("k5", &json!(5), None, &[]).await;

        let remaining = store.keys(ENTRY_PATTERN).await.unwrap();
        assert!(remaining.len() <= 5);
        assert!(!remaining.contains(&entry_key("k4")));
    }

    #[tokio::test]
    async fn test_stats_reflect_recent_metrics() {
        let (cache, _) = engine();
        cache.set("q1", &json!(1), None, &[]).await;
        cache.get("q1").await;
        cache.get("missing").await;
        let stats = cache.get_stats().await;
        assert_eq!(stats.total_keys, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
        assert!((stats.miss_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_top_keys_ordered_by_hits() {
        let (cache, _) = engine();
        cache.set("hot", &json!(1), None, &[]).await;
        cache.set("cold", &json!(2), None, &[]).await;
        for _ in 0..3 {
            cache.get("hot").await;
        }
        let stats = cache.get_stats().await;
        assert_eq!(stats.top_keys[0].key, "hot");
        assert_eq!(stats.top_keys[0].hit_count, 3);
    }

    #[tokio::test]
    async fn test_warmup_batches() {
        let (cache, _) = engine();
        let entries: Vec<WarmupEntry> = (0..250)
            .map(|i| WarmupEntry {
                key: format!("warm:{}", i),
                value: json!(i),
                ttl: Some(60),
                tags: vec![],
            })
            .collect();
        assert_eq!(cache.warmup(&entries).await, 250);
        assert_eq!(cache.get("warm:249").await, Some(json!(249)));
    }

    #[tokio::test]
    async fn test_sweep_repairs_missing_ttl() {
        let (cache, store) = engine();
        let entry = CacheEntry::new("loose".into(), b"1".to_vec(), 60_000, vec![]);
        let bytes = serde_json::to_vec(&entry).unwrap();
        store.set(&entry_key("loose"), &bytes, None).await.unwrap();

        let (repaired, _) = cache.sweep().await;
        assert_eq!(repaired, 1);
        assert!(matches!(
            store.ttl(&entry_key("loose")).await.unwrap(),
            KeyTtl::Remaining(_)
        ));
    }

    #[tokio::test]
    async fn test_get_degrades_to_miss_when_store_down() {
        let store = Arc::new(crate::store::test_support::DownStore);
        let monitor = Arc::new(PerformanceMonitor::new(
            store.clone(),
            AlertThresholds::default(),
            true,
        ));
        let cache = CacheEngine::new(store, monitor.clone(), &Config::default());

        assert_eq!(cache.get("anything").await, None);
        assert!(!cache.set("k", &json!(1), None, &[]).await);
        // The degradation cause lands on the emitted metric.
        let metrics = monitor.recent_cache_metrics(10).await;
        assert!(metrics.iter().all(|m| m.metadata.is_some()));
    }

    #[tokio::test]
    async fn test_mget_degrades_whole_batch_when_store_down() {
        let store = Arc::new(crate::store::test_support::DownStore);
        let monitor = Arc::new(PerformanceMonitor::new(
            store.clone(),
            AlertThresholds::default(),
            true,
        ));
        let cache = CacheEngine::new(store, monitor, &Config::default());

        let got = cache.mget(&["a".into(), "b".into()]).await;
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|(_, value)| value.is_none()));
    }

    #[tokio::test]
    async fn test_stats_zeroed_when_store_down() {
        let store = Arc::new(crate::store::test_support::DownStore);
        let monitor = Arc::new(PerformanceMonitor::new(
            store.clone(),
            AlertThresholds::default(),
            true,
        ));
        let cache = CacheEngine::new(store, monitor, &Config::default());

        let stats = cache.get_stats().await;
        assert_eq!(stats.total_keys, 0);
        assert_eq!(stats.hit_rate, 0.0);
        assert!(stats.top_keys.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_prunes_dead_tag_members() {
        let (cache, store) = engine();
        cache
            .set("alive", &json!(1), Some(60), &["t".to_string()])
            .await;
        store.sadd(&tag_key("t"), "dead").await.unwrap();

        let (_, pruned) = cache.sweep().await;
        assert_eq!(pruned, 1);
        let members = store.smembers(&tag_key("t")).await.unwrap();
        assert_eq!(members, vec!["alive"]);
    }
}
