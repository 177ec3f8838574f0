//! MFA Setup Use Case (authenticated two-phase enrollment)
//!
//! `request` mints a temporary secret and an enrollment token; both live
//! only in the fast store until `confirm` proves possession with a correct
//! code. An unverified secret is never written to the credential record, so
//! a half-finished enrollment can never lock anyone out.

use std::sync::Arc;

use audit::{AuditEvent, AuditPipeline};
use kernel::context::RequestContext;
use kernel::principal::CurrentUser;
use platform::crypto::{random_bytes, sha256, to_base64, to_base64_url};

use crate::application::config::AuthConfig;
use crate::domain::repository::{
    CredentialRepository, EnrollmentStore, PendingEnrollment, UserRepository,
};
use crate::domain::value_object::totp_secret::TotpSecret;
use crate::error::{AuthError, AuthResult};

/// MFA setup output
#[derive(Debug)]
pub struct MfaSetupOutput {
    /// Opaque token the client echoes back on confirm
    pub mfa_token: String,
    /// Secret for manual entry
    pub totp_secret: String,
    /// otpauth:// URL
    pub otpauth_url: String,
    /// QR code as base64-encoded PNG
    pub qr_code: String,
}

/// MFA setup use case
pub struct MfaSetupUseCase<R, E>
where
    R: UserRepository + CredentialRepository + Send + Sync,
    E: EnrollmentStore + Send + Sync,
{
    repo: Arc<R>,
    enrollments: Arc<E>,
    pipeline: AuditPipeline,
    config: Arc<AuthConfig>,
}

impl<R, E> MfaSetupUseCase<R, E>
where
    R: UserRepository + CredentialRepository + Send + Sync,
    E: EnrollmentStore + Send + Sync,
{
    pub fn new(
        repo: Arc<R>,
        enrollments: Arc<E>,
        pipeline: AuditPipeline,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            repo,
            enrollments,
            pipeline,
            config,
        }
    }

    /// Begin enrollment: generate the secret, park it in the fast store
    pub async fn request(&self, current_user: &CurrentUser) -> AuthResult<MfaSetupOutput> {
        let user = self
            .repo
            .find_by_id(&current_user.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let credential = self
            .repo
            .find_by_user_id(&current_user.user_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credential record missing".to_string()))?;

        if credential.mfa_enabled {
            return Err(AuthError::MfaAlreadySetup);
        }

        let secret = TotpSecret::generate();
        let mfa_token = to_base64_url(&random_bytes(32));

        self.enrollments
            .put(
                &token_hash(&mfa_token),
                &PendingEnrollment {
                    user_id: current_user.user_id,
                    totp_secret_base32: secret.as_base32().to_string(),
                },
                self.config.enrollment_ttl,
            )
            .await?;

        tracing::info!(user_id = %current_user.user_id, "MFA enrollment requested");

        Ok(MfaSetupOutput {
            mfa_token,
            totp_secret: secret.as_base32().to_string(),
            otpauth_url: secret.get_otpauth_url(user.email.as_str())?,
            qr_code: secret.generate_qr_code(user.email.as_str())?,
        })
    }

    /// Finish enrollment: prove possession, then persist the secret
    pub async fn confirm(
        &self,
        current_user: &CurrentUser,
        mfa_token: &str,
        otp: &str,
        ctx: &RequestContext,
    ) -> AuthResult<()> {
        let enrollment = self
            .enrollments
            .get(&token_hash(mfa_token))
            .await?
            .ok_or_else(|| AuthError::Validation("Enrollment token invalid or expired".to_string()))?;

        if enrollment.user_id != current_user.user_id {
            return Err(AuthError::Validation(
                "Enrollment token invalid or expired".to_string(),
            ));
        }

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

        if credential.mfa_enabled {
            return Err(AuthError::MfaAlreadySetup);
        }

        let secret = TotpSecret::from_base32(enrollment.totp_secret_base32)?;
        // A wrong code leaves the token alive for another try
        if !secret.verify(otp, user.email.as_str())? {
            return Err(AuthError::InvalidOtp);
        }

        // Possession proven: consume the token, then persist. Losing the
        // take race means another confirm already finished the job.
        if self.enrollments.take(&token_hash(mfa_token)).await?.is_none() {
            return Err(AuthError::MfaAlreadySetup);
        }

        credential.enable_mfa(secret);
        CredentialRepository::update(self.repo.as_ref(), &credential).await?;

        self.pipeline.push(
            AuditEvent::MfaEnrolled {
                user_id: current_user.user_id.into_uuid(),
            },
            ctx,
        );

        tracing::info!(user_id = %current_user.user_id, "MFA enabled");

        Ok(())
    }
}

/// Only the hash of the enrollment token touches the store
fn token_hash(token: &str) -> String {
    to_base64(&sha256(token.as_bytes()))
}
