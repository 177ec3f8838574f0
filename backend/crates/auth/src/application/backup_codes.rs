//! Backup Code Use Case (authenticated management surface)
//!
//! Generation is a step-up operation: a fresh TOTP code is required even on
//! an authenticated session. Regeneration replaces the stored set outright,
//! so codes from an earlier generation stop working immediately.
//!
//! Consumption during login lives in the flow service; this use case only
//! covers generation and the remaining-count view.

use std::sync::Arc;

use audit::{AuditEvent, AuditPipeline};
use kernel::context::RequestContext;
use kernel::principal::CurrentUser;

use crate::application::config::AuthConfig;
use crate::domain::repository::{CredentialRepository, UserRepository};
use crate::domain::value_object::backup_codes::BackupCodeSet;
use crate::error::{AuthError, AuthResult};

/// Remaining-count view
#[derive(Debug, Clone, Copy)]
pub struct BackupCodesRemaining {
    pub remaining: u32,
    pub total: u32,
}

/// Backup code use case
pub struct BackupCodeUseCase<R>
where
    R: UserRepository + CredentialRepository + Send + Sync,
{
    repo: Arc<R>,
    pipeline: AuditPipeline,
    config: Arc<AuthConfig>,
}

impl<R> BackupCodeUseCase<R>
where
    R: UserRepository + CredentialRepository + Send + Sync,
{
    pub fn new(repo: Arc<R>, pipeline: AuditPipeline, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            pipeline,
            config,
        }
    }

    /// Issue a new set of codes, invalidating any prior set
    pub async fn generate(
        &self,
        current_user: &CurrentUser,
        otp: &str,
        ctx: &RequestContext,
    ) -> AuthResult<Vec<String>> {
        let user = self
            .repo
            .find_by_id(&current_user.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let mut credential = self
            .repo
            .find_by_user_id(&current_user.user_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credential record missing".to_string()))?;

        if !credential.mfa_enabled {
            return Err(AuthError::MfaNotEnabled);
        }
        let secret = credential.totp_secret.as_ref().ok_or(AuthError::MfaBroken)?;

        // Step-up: possession of the authenticator, not just the session
        if !secret.verify(otp, user.email.as_str())? {
            return Err(AuthError::InvalidOtp);
        }

        let (set, codes) = BackupCodeSet::generate(self.config.backup_code_count);
        credential.replace_backup_codes(set);
        CredentialRepository::update(self.repo.as_ref(), &credential).await?;

        self.pipeline.push(
            AuditEvent::BackupCodesGenerated {
                user_id: current_user.user_id.into_uuid(),
                count: codes.len() as u32,
            },
            ctx,
        );

        tracing::info!(
            user_id = %current_user.user_id,
            count = codes.len(),
            "Backup codes regenerated"
        );

        Ok(codes)
    }

    /// Stored minus consumed
    pub async fn remaining(&self, current_user: &CurrentUser) -> AuthResult<BackupCodesRemaining> {
        let credential = self
            .repo
            .find_by_user_id(&current_user.user_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credential record missing".to_string()))?;

        Ok(BackupCodesRemaining {
            remaining: credential.backup_codes.remaining(),
            total: credential.backup_codes.total(),
        })
    }
}
