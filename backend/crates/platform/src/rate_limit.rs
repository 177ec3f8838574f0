//! Rate Limiting Infrastructure
//!
//! Window-based counting keyed by identifier + limit kind, with an explicit
//! block/unblock switch that is independent of the counters. Counting is a
//! single atomic increment in the fast store; the window rolling over resets
//! the count because each window gets its own key.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::faststore::{FastStore, StoreResult};

/// TTL applied to an administrative block with no explicit duration
const INDEFINITE_BLOCK: Duration = Duration::from_secs(30 * 24 * 3600);

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: i64,
    /// Denied by the administrative block switch, not by the counter
    pub blocked: bool,
}

/// Introspection view of one identifier's current window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub kind: String,
    pub identifier: String,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    pub count: u32,
    pub limit: u32,
    pub blocked: bool,
    pub blocked_until_ms: Option<i64>,
}

/// Fast-store-backed rate limiter
pub struct RateLimiter<S> {
    store: Arc<S>,
}

impl<S> RateLimiter<S>
where
    S: FastStore + Sync,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Count this request and decide. The block switch wins over counting.
    pub async fn check(
        &self,
        kind: &str,
        identifier: &str,
        config: &RateLimitConfig,
    ) -> StoreResult<RateLimitDecision> {
        let window_ms = config.window_ms();
        let now_ms = now_ms();
        let window_start = (now_ms / window_ms) * window_ms;
        let reset_at_ms = window_start + window_ms;

        if self.blocked_until(kind, identifier).await?.is_some() {
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms,
                blocked: true,
            });
        }

        // Counter key includes the window start; expiry outlives the window
        // slightly so late reads still see the closing count.
        let counter_key = counter_key(kind, identifier, window_start);
        let count = self
            .store
            .increment(&counter_key, config.window * 2)
            .await? as u32;

        let allowed = count <= config.max_requests;
        if !allowed {
            tracing::warn!(
                kind = %kind,
                identifier = %identifier,
                count = count,
                max = config.max_requests,
                "Rate limit exceeded"
            );
        }

        Ok(RateLimitDecision {
            allowed,
            remaining: config.max_requests.saturating_sub(count),
            reset_at_ms,
            blocked: false,
        })
    }

    /// Administratively block an identifier, independent of its counters
    pub async fn block(
        &self,
        kind: &str,
        identifier: &str,
        duration: Option<Duration>,
    ) -> StoreResult<()> {
        let ttl = duration.unwrap_or(INDEFINITE_BLOCK);
        let until_ms = now_ms() + ttl.as_millis() as i64;
        self.store
            .put(&block_key(kind, identifier), &until_ms.to_string(), ttl)
            .await?;
        tracing::info!(kind = %kind, identifier = %identifier, until_ms, "Identifier blocked");
        Ok(())
    }

    /// Clear an administrative block; counting state is untouched
    pub async fn unblock(&self, kind: &str, identifier: &str) -> StoreResult<bool> {
        let removed = self.store.remove(&block_key(kind, identifier)).await?;
        if removed {
            tracing::info!(kind = %kind, identifier = %identifier, "Identifier unblocked");
        }
        Ok(removed)
    }

    /// Read the current window without counting the caller
    pub async fn record(
        &self,
        kind: &str,
        identifier: &str,
        config: &RateLimitConfig,
    ) -> StoreResult<RateLimitRecord> {
        let window_ms = config.window_ms();
        let window_start = (now_ms() / window_ms) * window_ms;

        let count = match self
            .store
            .get(&counter_key(kind, identifier, window_start))
            .await?
        {
            Some(raw) => raw.parse().unwrap_or(0),
            None => 0,
        };
        let blocked_until_ms = self.blocked_until(kind, identifier).await?;

        Ok(RateLimitRecord {
            kind: kind.to_string(),
            identifier: identifier.to_string(),
            window_start_ms: window_start,
            window_end_ms: window_start + window_ms,
            count,
            limit: config.max_requests,
            blocked: blocked_until_ms.is_some(),
            blocked_until_ms,
        })
    }

    /// Purge expired windows (lazy in memory, TTL-native in Redis)
    pub async fn cleanup(&self) -> StoreResult<u64> {
        self.store.purge_expired().await
    }

    async fn blocked_until(&self, kind: &str, identifier: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .store
            .get(&block_key(kind, identifier))
            .await?
            .and_then(|raw| raw.parse().ok()))
    }
}

fn counter_key(kind: &str, identifier: &str, window_start_ms: i64) -> String {
    format!("rate:{kind}:{identifier}:{window_start_ms}")
}

fn block_key(kind: &str, identifier: &str) -> String {
    format!("rate:block:{kind}:{identifier}")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faststore::InMemoryFastStore;

    fn limiter() -> RateLimiter<InMemoryFastStore> {
        RateLimiter::new(Arc::new(InMemoryFastStore::new()))
    }

    #[tokio::test]
    async fn test_allows_until_limit() {
        let limiter = limiter();
        let config = RateLimitConfig::new(3, 60);

        for expected_remaining in [2u32, 1, 0] {
            let decision = limiter.check("login", "alice", &config).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check("login", "alice", &config).await.unwrap();
        assert!(!decision.allowed);
        assert!(!decision.blocked);
    }

    #[tokio::test]
    async fn test_identifiers_and_kinds_are_isolated() {
        let limiter = limiter();
        let config = RateLimitConfig::new(1, 60);

        assert!(limiter.check("login", "alice", &config).await.unwrap().allowed);
        assert!(limiter.check("login", "bob", &config).await.unwrap().allowed);
        assert!(limiter.check("otp", "alice", &config).await.unwrap().allowed);
        assert!(!limiter.check("login", "alice", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_window_rollover_resets_count() {
        let limiter = limiter();
        let config = RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(40),
        };

        assert!(limiter.check("login", "alice", &config).await.unwrap().allowed);
        assert!(!limiter.check("login", "alice", &config).await.unwrap().allowed);

        // Sleeping a full window guarantees a new window key
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.check("login", "alice", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_block_wins_over_counting() {
        let limiter = limiter();
        let config = RateLimitConfig::new(10, 60);

        limiter.block("login", "alice", None).await.unwrap();
        let decision = limiter.check("login", "alice", &config).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.blocked);

        assert!(limiter.unblock("login", "alice").await.unwrap());
        let decision = limiter.check("login", "alice", &config).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_timed_block_expires() {
        let limiter = limiter();
        let config = RateLimitConfig::new(10, 60);

        limiter
            .block("login", "alice", Some(Duration::ZERO))
            .await
            .unwrap();
        let decision = limiter.check("login", "alice", &config).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_unblock_without_block_is_noop() {
        let limiter = limiter();
        assert!(!limiter.unblock("login", "nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_reflects_state() {
        let limiter = limiter();
        let config = RateLimitConfig::new(5, 60);

        limiter.check("login", "alice", &config).await.unwrap();
        limiter.check("login", "alice", &config).await.unwrap();

        let record = limiter.record("login", "alice", &config).await.unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.limit, 5);
        assert!(!record.blocked);
        assert_eq!(record.window_end_ms - record.window_start_ms, 60_000);

        limiter.block("login", "alice", None).await.unwrap();
        let record = limiter.record("login", "alice", &config).await.unwrap();
        assert!(record.blocked);
        assert!(record.blocked_until_ms.is_some());
    }
}
