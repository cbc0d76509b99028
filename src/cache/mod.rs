//! Cache Module
//!
//! Cache engine over the shared key-value store: serialization, gzip
//! compression above a size threshold, per-entry metadata, and sampled
//! eviction against a configured entry ceiling.

mod engine;
mod entry;


// Re-export public types
pub use engine::{CacheEngine, CacheStatsReport, TopKey, WarmupEntry};
pub use entry::{current_timestamp_ms, CacheEntry};

// == Public Constants ==
/// Maximum allowed logical key length in bytes; longer keys are hash-folded
pub const MAX_KEY_LENGTH: usize = 256;

/// Serialized payloads above this many bytes are gzip-compressed
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Upper bound on keys examined by one eviction pass
pub const EVICTION_SAMPLE: usize = 1000;

/// Keys deleted per store call when clearing by pattern
pub const CLEAR_BATCH: usize = 100;

/// Entries written per batch during warmup
pub const WARMUP_BATCH: usize = 100;

/// Keys sampled when computing the top-hit-count list
pub const TOP_KEY_SAMPLE: usize = 100;

/// Buffered metrics consulted for hit rate and latency stats
pub const STATS_METRIC_WINDOW: usize = 1000;

/// Store key prefix for cache entries
pub const ENTRY_PREFIX: &str = "cache:entry:";

/// Store key prefix for tag reverse-index sets
pub const TAG_PREFIX: &str = "cache:tags:";

/// Glob pattern matching every cache entry key
pub const ENTRY_PATTERN: &str = "cache:entry:*";

/// Glob pattern matching every tag set key
pub const TAG_PATTERN: &str = "cache:tags:*";

// == Key Derivation ==
/// 32-bit rolling hash used to fold oversized logical keys.
///
/// Not collision-resistant at scale; kept for key-format compatibility.
pub fn rolling_hash32(input: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in input.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
    }
    hash
}

/// Store key for a logical cache key. Keys beyond [`MAX_KEY_LENGTH`] are
/// folded through the rolling hash.
pub fn entry_key(key: &str) -> String {
    if key.len() > MAX_KEY_LENGTH {
        format!("{}h:{:08x}", ENTRY_PREFIX, rolling_hash32(key))
    } else {
        format!("{}{}", ENTRY_PREFIX, key)
    }
}

/// Store key for a tag's reverse-index set.
pub fn tag_key(tag: &str) -> String {
    format!("{}{}", TAG_PREFIX, tag)
}

/// Logical key recovered from a store key, if it has the entry prefix.
pub fn logical_key(store_key: &str) -> Option<&str> {
    store_key.strip_prefix(ENTRY_PREFIX)
}

/// Coarse grouping of a logical key for metrics: the first two `:`-separated
/// segments, with a wildcard when more follow.
pub fn key_pattern(key: &str) -> String {
    let segments: Vec<&str> = key.splitn(3, ':').collect();
    match segments.as_slice() {
        [one] => (*one).to_string(),
        [a, b] => format!("{}:{}", a, b),
        [a, b, _rest] => format!("{}:{}:*", a, b),
        _ => key.to_string(),
    }
}
