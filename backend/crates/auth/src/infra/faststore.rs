//! Fast-Store Implementations
//!
//! Login transactions and pending enrollments live in the TTL-bound fast
//! store (Redis in production, in-memory in tests), JSON-encoded under
//! purpose-namespaced keys.

use std::sync::Arc;
use std::time::Duration;

use platform::faststore::FastStore;

use crate::domain::entity::auth_tx::AuthTx;
use crate::domain::repository::{AuthTxStore, EnrollmentStore, PendingEnrollment};
use crate::error::{AuthError, AuthResult};
use kernel::id::AuthTxId;

const AUTH_TX_PREFIX: &str = "authtx:";
const ENROLLMENT_PREFIX: &str = "mfaenroll:";

/// Login transaction store over any [`FastStore`]
pub struct FastStoreAuthTxStore<S> {
    store: Arc<S>,
}

impl<S> FastStoreAuthTxStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(auth_tx_id: AuthTxId) -> String {
        format!("{AUTH_TX_PREFIX}{auth_tx_id}")
    }
}

impl<S> AuthTxStore for FastStoreAuthTxStore<S>
where
    S: FastStore + Sync,
{
    async fn put(&self, tx: &AuthTx, ttl: Duration) -> AuthResult<()> {
        let json = serde_json::to_string(tx)
            .map_err(|e| AuthError::Internal(format!("AuthTx not serializable: {e}")))?;
        self.store.put(&Self::key(tx.auth_tx_id), &json, ttl).await?;
        Ok(())
    }

    async fn get(&self, auth_tx_id: AuthTxId) -> AuthResult<Option<AuthTx>> {
        let raw = self.store.get(&Self::key(auth_tx_id)).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AuthError::Internal(format!("Stored AuthTx not decodable: {e}")))
        })
        .transpose()
    }

    async fn delete(&self, auth_tx_id: AuthTxId) -> AuthResult<bool> {
        Ok(self.store.remove(&Self::key(auth_tx_id)).await?)
    }
}

/// Pending-enrollment store over any [`FastStore`]
pub struct FastStoreEnrollmentStore<S> {
    store: Arc<S>,
}

impl<S> FastStoreEnrollmentStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(token_hash: &str) -> String {
        format!("{ENROLLMENT_PREFIX}{token_hash}")
    }
}

impl<S> EnrollmentStore for FastStoreEnrollmentStore<S>
where
    S: FastStore + Sync,
{
    async fn put(
        &self,
        token_hash: &str,
        enrollment: &PendingEnrollment,
        ttl: Duration,
    ) -> AuthResult<()> {
        let json = serde_json::to_string(enrollment)
            .map_err(|e| AuthError::Internal(format!("Enrollment not serializable: {e}")))?;
        self.store.put(&Self::key(token_hash), &json, ttl).await?;
        Ok(())
    }

    async fn get(&self, token_hash: &str) -> AuthResult<Option<PendingEnrollment>> {
        let raw = self.store.get(&Self::key(token_hash)).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AuthError::Internal(format!("Stored enrollment not decodable: {e}")))
        })
        .transpose()
    }

    async fn take(&self, token_hash: &str) -> AuthResult<Option<PendingEnrollment>> {
        let key = Self::key(token_hash);
        let Some(json) = self.store.get(&key).await? else {
            return Ok(None);
        };

        // One-shot semantics: only the caller whose value-matched delete
        // wins gets the enrollment back.
        if !self.store.remove_if_match(&key, &json).await? {
            return Ok(None);
        }

        let enrollment = serde_json::from_str(&json)
            .map_err(|e| AuthError::Internal(format!("Stored enrollment not decodable: {e}")))?;
        Ok(Some(enrollment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::auth_tx::{AuthTx, AuthTxState, RiskSnapshot};
    use kernel::id::UserId;
    use platform::client::ClientFingerprint;
    use platform::faststore::InMemoryFastStore;

    fn tx() -> AuthTx {
        let fingerprint =
            ClientFingerprint::new([1u8; 32], [2u8; 32], None, Some("agent".to_string()));
        AuthTx::new(
            UserId::new(),
            AuthTxState::ChallengeMfaRequired,
            &fingerprint,
            RiskSnapshot::trusted(),
        )
    }

    #[tokio::test]
    async fn test_auth_tx_roundtrip_and_delete() {
        let store = FastStoreAuthTxStore::new(Arc::new(InMemoryFastStore::new()));
        let tx = tx();

        store.put(&tx, Duration::from_secs(60)).await.unwrap();
        let loaded = store.get(tx.auth_tx_id).await.unwrap().unwrap();
        assert_eq!(loaded.auth_tx_id, tx.auth_tx_id);
        assert_eq!(loaded.state, tx.state);

        assert!(store.delete(tx.auth_tx_id).await.unwrap());
        assert!(store.get(tx.auth_tx_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auth_tx_expires() {
        let store = FastStoreAuthTxStore::new(Arc::new(InMemoryFastStore::new()));
        let tx = tx();

        store.put(&tx, Duration::ZERO).await.unwrap();
        assert!(store.get(tx.auth_tx_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enrollment_take_is_one_shot() {
        let store = FastStoreEnrollmentStore::new(Arc::new(InMemoryFastStore::new()));
        let enrollment = PendingEnrollment {
            user_id: UserId::new(),
            totp_secret_base32: "JBSWY3DPEHPK3PXP".to_string(),
        };

        store
            .put("token-hash", &enrollment, Duration::from_secs(60))
            .await
            .unwrap();

        let taken = store.take("token-hash").await.unwrap().unwrap();
        assert_eq!(taken.user_id, enrollment.user_id);

        // Second take gets nothing
        assert!(store.take("token-hash").await.unwrap().is_none());
    }
}
