//! Redis Store
//!
//! Redis-backed implementation of the store trait using a multiplexed
//! connection manager. This is the production backend: counters and the
//! check-and-increment script run server-side, so they stay atomic across
//! concurrent backend instances sharing one store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::error::{CacheError, Result};
use crate::store::{CounterOutcome, KeyTtl, KeyValueStore, StoreInfo};

/// Server-side compare and increment. The TTL is applied only when the
/// counter is first created so repeat hits do not slide the window.
const CHECK_AND_INCR_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local limit = tonumber(ARGV[1])
if current >= limit then
    return {0, current}
end
current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return {1, current}
"#;

// == Redis Store ==
/// Redis implementation of [`KeyValueStore`].
pub struct RedisStore {
    conn: ConnectionManager,
    check_and_incr: redis::Script,
}

impl RedisStore {
    /// Connects to the store at `url` and verifies the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::StoreUnavailable(format!("Invalid store URL: {}", e)))?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to store at {}", url);
        Ok(Self {
            conn,
            check_and_incr: redis::Script::new(CHECK_AND_INCR_SCRIPT),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// Pulls an integer field out of INFO output (`field:value` lines).
fn parse_info_field(info: &str, field: &str) -> Option<u64> {
    info.lines()
        .find(|line| line.starts_with(field) && line.as_bytes().get(field.len()) == Some(&b':'))
        .and_then(|line| line[field.len() + 1..].trim().parse().ok())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8], ttl_ms: Option<u64>) -> Result<()> {
        let mut conn = self.conn();
        match ttl_ms {
            Some(ttl) => {
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl)
                    .query_async(&mut conn)
                    .await?;
            }
            None => {
                conn.set::<_, _, ()>(key, value).await?;
            }
        }
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        // MGET collapses to GET semantics for a single key in the client,
        // so issue the command explicitly to always get an array back.
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        Ok(cmd.query_async(&mut conn).await?)
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        Ok(conn.del(keys).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        Ok(conn.exists(key).await?)
    }

    async fn expire(&self, key: &str, ttl_ms: u64) -> Result<bool> {
        let mut conn = self.conn();
        Ok(conn.pexpire(key, ttl_ms as i64).await?)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut conn = self.conn();
        let ttl: i64 = conn.pttl(key).await?;
        Ok(match ttl {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::NoExpiry,
            ms => KeyTtl::Remaining(ms.max(0) as u64),
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.keys(pattern).await?)
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.sadd::<_, _, ()>(set, member).await?;
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.srem::<_, _, ()>(set, member).await?;
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.smembers(set).await?)
    }

    async fn sismember(&self, set: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn();
        Ok(conn.sismember(set, member).await?)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn();
        Ok(conn.incr(key, 1i64).await?)
    }

    async fn check_and_incr(
        &self,
        key: &str,
        limit: u64,
        window_ms: u64,
    ) -> Result<CounterOutcome> {
        let mut conn = self.conn();
        let reply: Vec<i64> = self
            .check_and_incr
            .key(key)
            .arg(limit)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;
        match reply.as_slice() {
            [allowed, count] => Ok(CounterOutcome {
                allowed: *allowed == 1,
                count: (*count).max(0) as u64,
            }),
            other => Err(CacheError::Internal(format!(
                "Unexpected script reply: {:?}",
                other
            ))),
        }
    }

    async fn info(&self) -> Result<StoreInfo> {
        let mut conn = self.conn();
        let info: String = redis::cmd("INFO").query_async(&mut conn).await?;
        let key_count: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(StoreInfo {
            used_memory_bytes: parse_info_field(&info, "used_memory").unwrap_or(0),
            connected_clients: parse_info_field(&info, "connected_clients").unwrap_or(0),
            key_count,
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
