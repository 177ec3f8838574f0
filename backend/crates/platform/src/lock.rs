//! Distributed Lock and Idempotency Guards
//!
//! Mutual exclusion and exactly-once guards on top of the fast store.
//! Every key carries a bounded TTL so a crashed holder can never wedge the
//! system; the TTL is the safety net, not the release path.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::faststore::{FastStore, StoreError};

const LOCK_PREFIX: &str = "lock:";
const IDEMPOTENCY_PREFIX: &str = "idem:";

#[derive(Debug, Error)]
pub enum LockError {
    /// Lock still held by someone else after exhausting retries
    #[error("Lock contended: {key}")]
    Contended { key: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Proof of lock ownership
///
/// Holds the unique token written at acquisition. Release only succeeds
/// while the stored token still matches, so a holder whose TTL lapsed
/// cannot delete a lock that was re-acquired by another caller.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Fast-store-backed mutual exclusion
pub struct LockManager<S> {
    store: Arc<S>,
}

impl<S> LockManager<S>
where
    S: FastStore + Sync,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Try to take the lock once. `None` means someone else holds it.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockGuard>, LockError> {
        let token = Uuid::new_v4().to_string();
        let store_key = format!("{LOCK_PREFIX}{key}");

        let acquired = self.store.put_if_absent(&store_key, &token, ttl).await?;
        if acquired {
            Ok(Some(LockGuard {
                key: store_key,
                token,
            }))
        } else {
            Ok(None)
        }
    }

    /// Poll for the lock with fixed backoff, failing loudly after
    /// `max_attempts` tries rather than blocking forever.
    pub async fn acquire_with_retry(
        &self,
        key: &str,
        ttl: Duration,
        max_attempts: u32,
        backoff: Duration,
    ) -> Result<LockGuard, LockError> {
        for attempt in 0..max_attempts {
            if let Some(guard) = self.acquire(key, ttl).await? {
                return Ok(guard);
            }
            if attempt + 1 < max_attempts {
                tokio::time::sleep(backoff).await;
            }
        }

        tracing::warn!(key = %key, attempts = max_attempts, "Lock acquisition gave up");
        Err(LockError::Contended {
            key: key.to_string(),
        })
    }

    /// Release the lock. A no-op (false) when the guard no longer owns the
    /// key; expired and re-acquired locks stay untouched.
    pub async fn release(&self, guard: &LockGuard) -> Result<bool, LockError> {
        let released = self
            .store
            .remove_if_match(&guard.key, &guard.token)
            .await?;
        if !released {
            tracing::warn!(key = %guard.key, "Lock already expired or owned elsewhere");
        }
        Ok(released)
    }
}

/// Exactly-once guard for mutation paths
pub struct IdempotencyGuard<S> {
    store: Arc<S>,
}

impl<S> IdempotencyGuard<S>
where
    S: FastStore + Sync,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Atomically test-and-mark the key. The first caller within the TTL
    /// window gets `true` and proceeds; everyone after gets `false` and
    /// knows the operation already ran.
    pub async fn check_and_set(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let store_key = format!("{IDEMPOTENCY_PREFIX}{key}");
        self.store.put_if_absent(&store_key, "1", ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faststore::InMemoryFastStore;

    fn manager() -> LockManager<InMemoryFastStore> {
        LockManager::new(Arc::new(InMemoryFastStore::new()))
    }

    #[tokio::test]
    async fn test_second_acquire_fails_until_release() {
        let locks = manager();
        let ttl = Duration::from_secs(30);

        let guard = locks.acquire("user-1", ttl).await.unwrap().unwrap();
        assert!(locks.acquire("user-1", ttl).await.unwrap().is_none());

        assert!(locks.release(&guard).await.unwrap());
        assert!(locks.acquire("user-1", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = manager();
        let ttl = Duration::from_secs(30);

        let _a = locks.acquire("user-1", ttl).await.unwrap().unwrap();
        assert!(locks.acquire("user-2", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_after_ttl_expiry() {
        let locks = manager();

        let _stale = locks.acquire("user-1", Duration::ZERO).await.unwrap().unwrap();
        assert!(
            locks
                .acquire("user-1", Duration::from_secs(30))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_release_by_non_owner_is_noop() {
        let locks = manager();

        let stale = locks.acquire("user-1", Duration::ZERO).await.unwrap().unwrap();
        let current = locks
            .acquire("user-1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        // The stale guard's token no longer matches; the live lock survives
        assert!(!locks.release(&stale).await.unwrap());
        assert!(locks.acquire("user-1", Duration::from_secs(30)).await.unwrap().is_none());

        assert!(locks.release(&current).await.unwrap());
    }

    #[tokio::test]
    async fn test_acquire_with_retry_gives_up() {
        let locks = manager();
        let ttl = Duration::from_secs(30);

        let _held = locks.acquire("user-1", ttl).await.unwrap().unwrap();
        let result = locks
            .acquire_with_retry("user-1", ttl, 3, Duration::from_millis(1))
            .await;

        assert!(matches!(result, Err(LockError::Contended { .. })));
    }

    #[tokio::test]
    async fn test_acquire_with_retry_succeeds_when_free() {
        let locks = manager();
        let guard = locks
            .acquire_with_retry("user-1", Duration::from_secs(30), 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(guard.key().ends_with("user-1"));
    }

    #[tokio::test]
    async fn test_idempotency_check_and_set() {
        let store = Arc::new(InMemoryFastStore::new());
        let guard = IdempotencyGuard::new(store);
        let ttl = Duration::from_secs(60);

        assert!(guard.check_and_set("op-123", ttl).await.unwrap());
        assert!(!guard.check_and_set("op-123", ttl).await.unwrap());
        assert!(guard.check_and_set("op-456", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_idempotency_window_expires() {
        let store = Arc::new(InMemoryFastStore::new());
        let guard = IdempotencyGuard::new(store);

        assert!(guard.check_and_set("op-123", Duration::ZERO).await.unwrap());
        assert!(
            guard
                .check_and_set("op-123", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }
}
