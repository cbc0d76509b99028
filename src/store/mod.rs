//! Store Module
//!
//! Abstraction over the remote, TTL-capable key-value store shared by every
//! backend instance. Two implementations are provided: a Redis-backed store
//! for production and an in-memory store for tests and single-node fallback.
//!
//! All TTLs and windows are expressed in milliseconds.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

use crate::error::Result;

// == Key TTL ==
/// Remaining lifetime of a key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist
    Missing,
    /// The key exists but has no expiry set
    NoExpiry,
    /// The key expires in this many milliseconds
    Remaining(u64),
}

// == Counter Outcome ==
/// Result of the atomic check-and-increment primitive.
#[derive(Debug, Clone, Copy)]
pub struct CounterOutcome {
    /// Whether the increment was applied (count was below the limit)
    pub allowed: bool,
    /// Counter value after the call
    pub count: u64,
}

// == Store Introspection ==
/// Snapshot of store-level system metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreInfo {
    /// Memory used by the store in bytes
    pub used_memory_bytes: u64,
    /// Number of connected clients
    pub connected_clients: u64,
    /// Total number of keys
    pub key_count: u64,
}

// == Key Value Store Trait ==
/// Operations required from the backing key-value store.
///
/// The system is agnostic to the concrete store as long as these primitives
/// exist with the stated atomicity: `incr` and `check_and_incr` must be
/// atomic across concurrent callers in separate processes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the raw bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes `value` under `key`, with an optional TTL in milliseconds.
    async fn set(&self, key: &str, value: &[u8], ttl_ms: Option<u64>) -> Result<()>;

    /// Reads many keys at once; the result has one slot per requested key.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Deletes the given keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// Returns whether `key` exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Sets or replaces the TTL of an existing key.
    /// Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl_ms: u64) -> Result<bool>;

    /// Reports the remaining TTL of a key.
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Scans for keys matching a glob pattern.
    ///
    /// Bounded by the store's response size; intended for administrative
    /// scans and scheduled maintenance, never the per-request path.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Adds a member to a set.
    async fn sadd(&self, set: &str, member: &str) -> Result<()>;

    /// Removes a member from a set.
    async fn srem(&self, set: &str, member: &str) -> Result<()>;

    /// Returns every member of a set.
    async fn smembers(&self, set: &str) -> Result<Vec<String>>;

    /// Returns whether `member` belongs to `set`.
    async fn sismember(&self, set: &str, member: &str) -> Result<bool>;

    /// Atomically increments an integer key, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Atomic server-side check-and-increment with expiry-on-create.
    ///
    /// Reads the counter, compares it to `limit`, increments only while
    /// below the limit, and sets the TTL to `window_ms` when the counter is
    /// first created. Safe for strict enforcement across processes.
    async fn check_and_incr(&self, key: &str, limit: u64, window_ms: u64)
        -> Result<CounterOutcome>;

    /// Reads store-level system metrics.
    async fn info(&self) -> Result<StoreInfo>;

    /// Health check round trip.
    async fn ping(&self) -> Result<()>;
}
