//! Redis Fast Store
//!
//! Production implementation of [`FastStore`] on a shared Redis connection
//! manager. The check-and-mutate operations are single server-side
//! operations: `SET NX PX` for conditional writes and Lua scripts where one
//! command is not enough.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::faststore::{FastStore, StoreError, StoreResult};

/// Delete the key only when it still holds the expected value
const REMOVE_IF_MATCH_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Increment, arming the TTL only on counter creation
const INCREMENT_SCRIPT: &str = r#"
local n = redis.call('INCR', KEYS[1])
if n == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return n
"#;

/// Redis-backed fast store
///
/// `ConnectionManager` multiplexes and reconnects internally; cloning this
/// store is cheap and all clones share the connection.
#[derive(Clone)]
pub struct RedisFastStore {
    conn: ConnectionManager,
    remove_if_match: Script,
    increment: Script,
}

impl RedisFastStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            remove_if_match: Script::new(REMOVE_IF_MATCH_SCRIPT),
            increment: Script::new(INCREMENT_SCRIPT),
        }
    }

    /// Connect to Redis by URL (`redis://host:port/db`)
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(StoreError::from)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(StoreError::from)?;
        Ok(Self::new(conn))
    }

    fn ttl_ms(ttl: Duration) -> u64 {
        // PX 0 is rejected by Redis; clamp to the shortest expirable window
        (ttl.as_millis() as u64).max(1)
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl FastStore for RedisFastStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(Self::ttl_ms(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        // SET NX returns OK on success, nil when the key already exists
        let outcome: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(Self::ttl_ms(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(outcome.is_some())
    }

    async fn remove(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn remove_if_match(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .remove_if_match
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .increment
            .key(key)
            .arg(Self::ttl_ms(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        // Redis expires keys natively; nothing to reclaim by hand
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_ms_clamps_zero() {
        assert_eq!(RedisFastStore::ttl_ms(Duration::ZERO), 1);
        assert_eq!(RedisFastStore::ttl_ms(Duration::from_secs(2)), 2_000);
    }
}
