//! Resolve Session Use Case
//!
//! Maps a bearer token to a usable session and the caller identity.
//! Revoked sessions never resolve; that is the enforcement point for the
//! monotonic-revocation invariant.

use std::sync::Arc;

use kernel::principal::CurrentUser;
use platform::crypto::constant_time_eq;

use crate::application::config::SessionConfig;
use crate::application::token::verify_access_token;
use crate::domain::entity::Session;
use crate::domain::repository::SessionRepository;
use crate::error::{SessionError, SessionResult};

/// Resolve session use case
pub struct ResolveSessionUseCase<S>
where
    S: SessionRepository + Clone + Send + Sync + 'static,
{
    repo: Arc<S>,
    config: Arc<SessionConfig>,
}

impl<S> ResolveSessionUseCase<S>
where
    S: SessionRepository + Clone + Send + Sync + 'static,
{
    pub fn new(repo: Arc<S>, config: Arc<SessionConfig>) -> Self {
        Self { repo, config }
    }

    /// Resolve the caller identity, verifying token signature, liveness and
    /// client binding
    pub async fn execute(
        &self,
        bearer_token: &str,
        fingerprint_hash: &[u8],
    ) -> SessionResult<CurrentUser> {
        let session = self.get_session(bearer_token, fingerprint_hash).await?;
        Ok(CurrentUser::new(
            session.user_id,
            session.session_id,
            session.user_role,
        ))
    }

    /// Resolve and return the full session record
    pub async fn get_session(
        &self,
        bearer_token: &str,
        fingerprint_hash: &[u8],
    ) -> SessionResult<Session> {
        let session_id = verify_access_token(&self.config.token_secret, bearer_token)
            .ok_or(SessionError::SessionInvalid)?;

        let mut session = self
            .repo
            .find_by_id(session_id)
            .await?
            .ok_or(SessionError::SessionInvalid)?;

        // Revocation is monotonic; a revoked session is gone for good
        if session.revoked {
            return Err(SessionError::SessionInvalid);
        }
        if session.is_expired() {
            return Err(SessionError::SessionExpired);
        }

        if !constant_time_eq(&session.client_fingerprint_hash, fingerprint_hash) {
            return Err(SessionError::FingerprintMismatch);
        }

        // Update last activity in the background
        session.touch();
        let repo = self.repo.clone();
        let touched_at = session.last_activity_at;
        tokio::spawn(async move {
            if let Err(e) = repo.touch(session_id, touched_at).await {
                tracing::warn!(error = %e, "Failed to update session activity");
            }
        });

        Ok(session)
    }

    /// Just check whether the token resolves (returns bool)
    pub async fn is_valid(&self, bearer_token: &str, fingerprint_hash: &[u8]) -> bool {
        self.get_session(bearer_token, fingerprint_hash)
            .await
            .is_ok()
    }
}
