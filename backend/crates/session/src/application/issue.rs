//! Issue Session Use Case
//!
//! Creates a session and mints its token pair. Under the single-session
//! policy, the enumerate-revoke-issue sequence runs as a critical section
//! per user: a distributed lock keyed by the user id closes the race where
//! two concurrent logins both observe zero prior sessions and both survive.

use std::sync::Arc;

use audit::{AuditEvent, AuditPipeline};
use kernel::context::RequestContext;
use kernel::id::{SessionId, UserId};
use kernel::principal::UserRole;
use platform::client::ClientFingerprint;
use platform::crypto::{random_bytes, sha256, to_base64_url};
use platform::faststore::FastStore;
use platform::lock::LockManager;

use crate::application::config::SessionConfig;
use crate::application::token::sign_access_token;
use crate::domain::entity::Session;
use crate::domain::repository::SessionRepository;
use crate::error::{SessionError, SessionResult};

/// Issue session output
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: SessionId,
    pub access_token: String,
    /// Returned exactly once; only its hash is stored
    pub refresh_token: String,
    pub expires_at_ms: i64,
}

/// Issue session use case
pub struct IssueSessionUseCase<S, F>
where
    S: SessionRepository,
    F: FastStore + Sync,
{
    repo: Arc<S>,
    locks: Arc<LockManager<F>>,
    pipeline: AuditPipeline,
    config: Arc<SessionConfig>,
}

impl<S, F> IssueSessionUseCase<S, F>
where
    S: SessionRepository,
    F: FastStore + Sync,
{
    pub fn new(
        repo: Arc<S>,
        locks: Arc<LockManager<F>>,
        pipeline: AuditPipeline,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            repo,
            locks,
            pipeline,
            config,
        }
    }

    pub async fn execute(
        &self,
        user_id: UserId,
        role: UserRole,
        fingerprint: &ClientFingerprint,
        ctx: &RequestContext,
    ) -> SessionResult<IssuedSession> {
        if !self.config.single_session {
            return self.issue(user_id, role, fingerprint, ctx).await;
        }

        let guard = self
            .locks
            .acquire_with_retry(
                &format!("session-issue:{user_id}"),
                self.config.issue_lock_ttl,
                self.config.issue_lock_attempts,
                self.config.issue_lock_backoff,
            )
            .await?;

        let result = self.revoke_then_issue(user_id, role, fingerprint, ctx).await;

        if let Err(e) = self.locks.release(&guard).await {
            tracing::warn!(error = %e, user_id = %user_id, "Issuance lock release failed");
        }

        result
    }

    /// Critical section body: prior sessions are revoked before the new one
    /// exists, so there is no window with two usable sessions.
    async fn revoke_then_issue(
        &self,
        user_id: UserId,
        role: UserRole,
        fingerprint: &ClientFingerprint,
        ctx: &RequestContext,
    ) -> SessionResult<IssuedSession> {
        let revoked = self.repo.revoke_for_user(&user_id, None).await?;
        for session_id in &revoked {
            self.pipeline.push(
                AuditEvent::SessionRevoked {
                    user_id: user_id.into_uuid(),
                    session_id: session_id.into_uuid(),
                    by_admin: false,
                },
                ctx,
            );
        }
        if !revoked.is_empty() {
            tracing::info!(
                user_id = %user_id,
                revoked = revoked.len(),
                "Single-session policy revoked prior sessions"
            );
        }

        self.issue(user_id, role, fingerprint, ctx).await
    }

    async fn issue(
        &self,
        user_id: UserId,
        role: UserRole,
        fingerprint: &ClientFingerprint,
        ctx: &RequestContext,
    ) -> SessionResult<IssuedSession> {
        let refresh_bytes = random_bytes(32);
        let refresh_token = to_base64_url(&refresh_bytes);
        let refresh_token_hash = sha256(refresh_token.as_bytes()).to_vec();

        let ttl = chrono::Duration::from_std(self.config.session_ttl)
            .map_err(|e| SessionError::Internal(format!("Invalid session TTL: {e}")))?;

        let session = Session::new(
            user_id,
            role,
            refresh_token_hash,
            fingerprint.device_hash_vec(),
            fingerprint.ip_string(),
            fingerprint.user_agent.clone(),
            ttl,
        );

        self.repo.create(&session).await?;

        let access_token = sign_access_token(&self.config.token_secret, session.session_id);

        self.pipeline.push(
            AuditEvent::SessionIssued {
                user_id: user_id.into_uuid(),
                session_id: session.session_id.into_uuid(),
            },
            ctx,
        );

        tracing::info!(
            user_id = %user_id,
            session_id = %session.session_id,
            "Session issued"
        );

        Ok(IssuedSession {
            session_id: session.session_id,
            access_token,
            refresh_token,
            expires_at_ms: session.expires_at_ms,
        })
    }
}
