//! Cache Entry Module
//!
//! Defines the stored envelope for individual cache entries: the (possibly
//! compressed) payload bytes plus the metadata the eviction and invalidation
//! passes read.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A single cache entry as persisted in the backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Logical cache key
    pub key: String,
    /// Serialized payload bytes; gzip-compressed when `compressed` is set
    pub payload: Vec<u8>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds); always after `created_at`
    pub expires_at: u64,
    /// Successful reads served from this entry
    pub hit_count: u64,
    /// Tags the entry was stored with, without duplicates
    pub tags: Vec<String>,
    /// Whether `payload` is gzip-compressed
    pub compressed: bool,
    /// Serialized payload size before compression
    pub raw_size: u64,
    /// Payload size after compression, when compression was applied
    pub compressed_size: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl_ms` milliseconds from now.
    ///
    /// A zero TTL is bumped to one millisecond so the expiry always lies
    /// strictly after the creation time. Duplicate tags are dropped.
    pub fn new(key: String, payload: Vec<u8>, ttl_ms: u64, mut tags: Vec<String>) -> Self {
        let now = current_timestamp_ms();
        tags.sort();
        tags.dedup();
        let raw_size = payload.len() as u64;
        Self {
            key,
            payload,
            created_at: now,
            expires_at: now + ttl_ms.max(1),
            hit_count: 0,
            tags,
            compressed: false,
            raw_size,
            compressed_size: None,
        }
    }

    /// Replaces the payload with its compressed form.
    ///
    /// Only marks the entry compressed when the compressed bytes are
    /// actually smaller than the raw ones.
    pub fn apply_compression(&mut self, compressed: Vec<u8>) {
        if (compressed.len() as u64) < self.raw_size {
            self.compressed_size = Some(compressed.len() as u64);
            self.payload = compressed;
            self.compressed = true;
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired. An entry is expired once the
    /// current time reaches `expires_at`.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms() >= self.expires_at
    }

    // == Time To Live ==
    /// Remaining TTL in milliseconds; zero once expired.
    pub fn remaining_ttl_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }

    /// Records a successful read.
    pub fn record_hit(&mut self) {
        self.hit_count += 1;
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
