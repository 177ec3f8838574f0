//! Revoke Sessions Use Case
//!
//! Self-service revocation (all active sessions or a chosen subset) plus
//! the privileged bulk form used by administrative tooling. Revoking
//! nothing is a successful no-op, and revoking an already-revoked session
//! stays idempotent because the repository only flips live rows.

use std::sync::Arc;

use audit::{AuditEvent, AuditPipeline};
use kernel::context::RequestContext;
use kernel::id::SessionId;
use kernel::principal::CurrentUser;

use crate::domain::repository::SessionRepository;
use crate::error::SessionResult;

/// Revoke sessions use case
pub struct RevokeSessionsUseCase<S>
where
    S: SessionRepository,
{
    repo: Arc<S>,
    pipeline: AuditPipeline,
}

impl<S> RevokeSessionsUseCase<S>
where
    S: SessionRepository,
{
    pub fn new(repo: Arc<S>, pipeline: AuditPipeline) -> Self {
        Self { repo, pipeline }
    }

    /// Revoke the caller's active sessions. `ids: None` means all of them;
    /// ids belonging to other users are silently ignored by the ownership
    /// filter. Returns how many sessions were revoked.
    pub async fn execute(
        &self,
        current_user: &CurrentUser,
        ids: Option<Vec<SessionId>>,
        ctx: &RequestContext,
    ) -> SessionResult<usize> {
        let revoked = self
            .repo
            .revoke_for_user(&current_user.user_id, ids.as_deref())
            .await?;

        for session_id in &revoked {
            self.pipeline.push(
                AuditEvent::SessionRevoked {
                    user_id: current_user.user_id.into_uuid(),
                    session_id: session_id.into_uuid(),
                    by_admin: false,
                },
                ctx,
            );
        }

        tracing::info!(
            user_id = %current_user.user_id,
            revoked = revoked.len(),
            "Sessions revoked"
        );

        Ok(revoked.len())
    }

    /// Privileged bulk revocation without the ownership filter. One audit
    /// entry per revoked session.
    pub async fn execute_many(
        &self,
        ids: &[SessionId],
        ctx: &RequestContext,
    ) -> SessionResult<usize> {
        let revoked = self.repo.revoke_many(ids).await?;

        for (user_id, session_id) in &revoked {
            self.pipeline.push(
                AuditEvent::SessionRevoked {
                    user_id: user_id.into_uuid(),
                    session_id: session_id.into_uuid(),
                    by_admin: true,
                },
                ctx,
            );
        }

        tracing::info!(
            requested = ids.len(),
            revoked = revoked.len(),
            "Administrative session revocation"
        );

        Ok(revoked.len())
    }
}
