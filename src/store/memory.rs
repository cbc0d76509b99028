//! In-Memory Store
//!
//! HashMap-backed implementation of the store trait with lazy TTL expiry.
//! Used by the test suite and as a single-node fallback when no remote
//! store is configured. Not shared across processes.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;

use crate::error::{CacheError, Result};
use crate::store::{CounterOutcome, KeyTtl, KeyValueStore, StoreInfo};

/// Returns current Unix timestamp in milliseconds.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

// == Stored Values ==
#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct StoredSet {
    members: HashSet<String>,
    expires_at: Option<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, StoredValue>,
    sets: HashMap<String, StoredSet>,
}

impl Inner {
    /// Drops a value or set whose expiry has passed. Expiry is lazy: keys
    /// linger until the next access, same as the remote store's semantics
    /// from the caller's point of view.
    fn expire_if_due(&mut self, key: &str) {
        let now = now_ms();
        let value_due = self
            .values
            .get(key)
            .is_some_and(|v| v.expires_at.is_some_and(|at| now >= at));
        if value_due {
            self.values.remove(key);
        }
        let set_due = self
            .sets
            .get(key)
            .is_some_and(|s| s.expires_at.is_some_and(|at| now >= at));
        if set_due {
            self.sets.remove(key);
        }
    }
}

// == Memory Store ==
/// In-memory implementation of [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Translates a redis-style glob pattern (`*`, `?`) to an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| CacheError::InvalidRequest(format!("Invalid pattern: {}", e)))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(key);
        Ok(inner.values.get(key).map(|v| v.data.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_ms: Option<u64>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.values.insert(
            key.to_string(),
            StoredValue {
                data: value.to_vec(),
                expires_at: ttl_ms.map(|ttl| now_ms() + ttl),
            },
        );
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut inner = self.inner.write().await;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            inner.expire_if_due(key);
            out.push(inner.values.get(key).map(|v| v.data.clone()));
        }
        Ok(out)
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut removed = 0;
        for key in keys {
            inner.expire_if_due(key);
            if inner.values.remove(key).is_some() || inner.sets.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(key);
        Ok(inner.values.contains_key(key) || inner.sets.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl_ms: u64) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(key);
        let deadline = Some(now_ms() + ttl_ms);
        if let Some(v) = inner.values.get_mut(key) {
            v.expires_at = deadline;
            return Ok(true);
        }
        if let Some(s) = inner.sets.get_mut(key) {
            s.expires_at = deadline;
            return Ok(true);
        }
        Ok(false)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(key);
        let expires_at = if let Some(v) = inner.values.get(key) {
            v.expires_at
        } else if let Some(s) = inner.sets.get(key) {
            s.expires_at
        } else {
            return Ok(KeyTtl::Missing);
        };
        Ok(match expires_at {
            None => KeyTtl::NoExpiry,
            Some(at) => KeyTtl::Remaining(at.saturating_sub(now_ms())),
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let re = glob_to_regex(pattern)?;
        let now = now_ms();
        let inner = self.inner.read().await;
        let mut out: Vec<String> = inner
            .values
            .iter()
            .filter(|(_, v)| !v.expires_at.is_some_and(|at| now >= at))
            .map(|(k, _)| k.clone())
            .chain(
                inner
                    .sets
                    .iter()
                    .filter(|(_, s)| !s.expires_at.is_some_and(|at| now >= at))
                    .map(|(k, _)| k.clone()),
            )
            .filter(|k| re.is_match(k))
            .collect();
        out.sort();
        Ok(out)
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(set);
        inner
            .sets
            .entry(set.to_string())
            .or_default()
            .members
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(set);
        let now_empty = match inner.sets.get_mut(set) {
            Some(s) => {
                s.members.remove(member);
                s.members.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.sets.remove(set);
        }
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(set);
        Ok(inner
            .sets
            .get(set)
            .map(|s| s.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, set: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(set);
        Ok(inner
            .sets
            .get(set)
            .is_some_and(|s| s.members.contains(member)))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.expire_if_due(key);
        let current = match inner.values.get(key) {
            Some(v) => std::str::from_utf8(&v.data)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    CacheError::Serialization(format!("Key '{}' is not an integer", key))
                })?,
            None => 0,
        };
        let next = current + 1;
        let expires_at = inner.values.get(key).and_then(|v| v.expires_at);
        inner.values.insert(
            key.to_string(),
            StoredValue {
                data: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn check_and_incr(
        &self,
        key: &str,
        limit: u64,
        window_ms: u64,
    ) -> Result<CounterOutcome> {
        // The single write guard makes read-compare-increment atomic here;
        // the remote store achieves the same with a server-side script.
        let mut inner = self.inner.write().await;
        inner.expire_if_due(key);
        let current: u64 = inner
            .values
            .get(key)
            .and_then(|v| std::str::from_utf8(&v.data).ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        if current >= limit {
            return Ok(CounterOutcome {
                allowed: false,
                count: current,
            });
        }
        let next = current + 1;
        let expires_at = if next == 1 {
            Some(now_ms() + window_ms)
        } else {
            inner.values.get(key).and_then(|v| v.expires_at)
        };
        inner.values.insert(
            key.to_string(),
            StoredValue {
                data: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(CounterOutcome {
            allowed: true,
            count: next,
        })
    }

    async fn info(&self) -> Result<StoreInfo> {
        let inner = self.inner.read().await;
        let used: usize = inner.values.values().map(|v| v.data.len()).sum();
        Ok(StoreInfo {
            used_memory_bytes: used as u64,
            connected_clients: 1,
            key_count: (inner.values.len() + inner.sets.len()) as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store.set("k", b"v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_lazy() {
        let store = MemoryStore::new();
        store.set("k", b"v", Some(20)).await.unwrap();
        assert!(store.exists("k").await.unwrap());
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_ttl_reporting() {
        let store = MemoryStore::new();
        store.set("forever", b"v", None).await.unwrap();
        store.set("limited", b"v", Some(60_000)).await.unwrap();
        assert_eq!(store.ttl("forever").await.unwrap(), KeyTtl::NoExpiry);
        match store.ttl("limited").await.unwrap() {
            KeyTtl::Remaining(ms) => assert!(ms <= 60_000 && ms > 55_000),
            other => panic!("unexpected ttl {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expire_updates_deadline() {
        let store = MemoryStore::new();
        store.set("k", b"v", None).await.unwrap();
        assert!(store.expire("k", 60_000).await.unwrap());
        assert!(matches!(
            store.ttl("k").await.unwrap(),
            KeyTtl::Remaining(_)
        ));
        assert!(!store.expire("missing", 1000).await.unwrap());
    }

    #[tokio::test]
    async fn test_mget_preserves_order() {
        let store = MemoryStore::new();
        store.set("a", b"1", None).await.unwrap();
        store.set("c", b"3", None).await.unwrap();
        let got = store
            .mget(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(got, vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]);
    }

    #[tokio::test]
    async fn test_del_counts_existing() {
        let store = MemoryStore::new();
        store.set("a", b"1", None).await.unwrap();
        store.set("b", b"2", None).await.unwrap();
        let removed = store
            .del(&["a".into(), "b".into(), "ghost".into()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_keys_glob_matching() {
        let store = MemoryStore::new();
        store.set("cache:entry:a", b"1", None).await.unwrap();
        store.set("cache:entry:b", b"2", None).await.unwrap();
        store.set("ratelimit:x", b"3", None).await.unwrap();
        let keys = store.keys("cache:entry:*").await.unwrap();
        assert_eq!(keys, vec!["cache:entry:a", "cache:entry:b"]);
        let single = store.keys("cache:entry:?").await.unwrap();
        assert_eq!(single.len(), 2);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryStore::new();
        store.sadd("tags", "a").await.unwrap();
        store.sadd("tags", "b").await.unwrap();
        store.sadd("tags", "a").await.unwrap();
        let mut members = store.smembers("tags").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);
        assert!(store.sismember("tags", "a").await.unwrap());
        store.srem("tags", "a").await.unwrap();
        assert!(!store.sismember("tags", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_srem_drops_empty_set() {
        let store = MemoryStore::new();
        store.sadd("tags", "only").await.unwrap();
        store.srem("tags", "only").await.unwrap();
        assert!(!store.exists("tags").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_sequence() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        assert_eq!(store.incr("counter").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_check_and_incr_enforces_limit() {
        let store = MemoryStore::new();
        for i in 1..=3 {
            let outcome = store.check_and_incr("rl", 3, 60_000).await.unwrap();
            assert!(outcome.allowed);
            assert_eq!(outcome.count, i);
        }
        let denied = store.check_and_incr("rl", 3, 60_000).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.count, 3);
    }

    #[tokio::test]
    async fn test_check_and_incr_sets_expiry_once() {
        let store = MemoryStore::new();
        store.check_and_incr("rl", 10, 50).await.unwrap();
        store.check_and_incr("rl", 10, 50).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        // Window rolled: the counter restarts from zero.
        let outcome = store.check_and_incr("rl", 10, 50).await.unwrap();
        assert_eq!(outcome.count, 1);
    }

    #[tokio::test]
    async fn test_info_counts_keys() {
        let store = MemoryStore::new();
        store.set("a", b"12345", None).await.unwrap();
        store.sadd("s", "m").await.unwrap();
        let info = store.info().await.unwrap();
        assert_eq!(info.key_count, 2);
        assert_eq!(info.used_memory_bytes, 5);
    }
}
