//! Fast Ephemeral Store
//!
//! Abstraction over the TTL-bound key/value store that holds login
//! transactions, enrollment tokens, locks, idempotency keys, and rate-limit
//! counters. Redis backs it in production ([`crate::redis_store`]); the
//! in-memory implementation here backs unit tests and local development.
//!
//! Every operation is atomic from the caller's point of view. That is the
//! whole contract: check-and-mutate steps (`put_if_absent`,
//! `remove_if_match`, `increment`) must be single indivisible operations on
//! the backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Fast-store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Stored value is not valid for this operation: {0}")]
    Encoding(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic key/value operations with per-key TTLs
#[trait_variant::make(FastStore: Send)]
pub trait LocalFastStore {
    /// Read a live value; expired keys read as absent
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value with a TTL, replacing any previous value
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Write only when the key is absent. Returns true when this caller won.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete a key. Returns true when a live value was removed.
    async fn remove(&self, key: &str) -> StoreResult<bool>;

    /// Delete only when the stored value equals `expected`.
    /// Returns true when the delete happened.
    async fn remove_if_match(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Increment a counter, setting the TTL when the counter is created.
    /// Returns the post-increment value.
    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    /// Purge expired entries. Redis expires natively and reports 0; the
    /// in-memory store reclaims here.
    async fn purge_expired(&self) -> StoreResult<u64>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Mutex-guarded in-memory store. Atomicity comes from holding the map lock
/// for the whole operation; no await points occur under the lock.
#[derive(Default)]
pub struct InMemoryFastStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().expect("fast store poisoned")
    }
}

impl FastStore for InMemoryFastStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.lock();
        let live = entries.get(key).is_some_and(|e| !e.is_expired());
        if live {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn remove(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.lock();
        match entries.remove(key) {
            Some(entry) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn remove_if_match(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut entries = self.lock();
        let matches = entries
            .get(key)
            .is_some_and(|e| !e.is_expired() && e.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut entries = self.lock();

        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry
                .value
                .parse::<i64>()
                .map_err(|e| StoreError::Encoding(e.to_string()))?,
            _ => 0,
        };

        let next = current + 1;
        let expires_at = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry.expires_at,
            _ => Instant::now() + ttl,
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::{Duration, FastStore, InMemoryFastStore};

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = InMemoryFastStore::new();
        store
            .put("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_reads_as_absent() {
        let store = InMemoryFastStore::new();
        store.put("k", "v", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_if_absent() {
        let store = InMemoryFastStore::new();
        assert!(
            store
                .put_if_absent("k", "first", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert!(
            !store
                .put_if_absent("k", "second", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_put_if_absent_after_expiry() {
        let store = InMemoryFastStore::new();
        store.put("k", "old", Duration::ZERO).await.unwrap();
        assert!(
            store
                .put_if_absent("k", "new", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert_eq!(store.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_remove_if_match() {
        let store = InMemoryFastStore::new();
        store
            .put("k", "token-a", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!store.remove_if_match("k", "token-b").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("token-a".to_string()));

        assert!(store.remove_if_match("k", "token-a").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment() {
        let store = InMemoryFastStore::new();
        assert_eq!(
            store.increment("n", Duration::from_secs(60)).await.unwrap(),
            1
        );
        assert_eq!(
            store.increment("n", Duration::from_secs(60)).await.unwrap(),
            2
        );
        assert_eq!(
            store.increment("n", Duration::from_secs(60)).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_increment_restarts_after_expiry() {
        let store = InMemoryFastStore::new();
        store.increment("n", Duration::ZERO).await.unwrap();
        assert_eq!(
            store.increment("n", Duration::from_secs(60)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryFastStore::new();
        store.put("live", "v", Duration::from_secs(60)).await.unwrap();
        store.put("dead1", "v", Duration::ZERO).await.unwrap();
        store.put("dead2", "v", Duration::ZERO).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert_eq!(store.get("live").await.unwrap(), Some("v".to_string()));
    }
}
