//! Login Flow Service - the challenge state machine
//!
//! Orchestrates a login from the bare credential check through zero or more
//! challenges to an issued session:
//!
//! ```text
//! PasswordVerified ──► ChallengeMfaRequired ──┐
//!        │        ──► ChallengeMfaEnroll   ──┤──► Completed
//!        │        ──────────────────────────►│
//!        └───────────► ChallengeDeviceVerify ┘
//! ```
//!
//! Decision table at password verification:
//! - no MFA + trusted device: complete directly
//! - MFA enabled: TOTP challenge (backup code as fallback when codes remain)
//! - MFA enabled but secret missing: backup-code-only when codes remain,
//!   `MfaBroken` otherwise
//! - MFA mandated by role but not enrolled: inline enrollment challenge
//! - untrusted device / new IP: email one-time code; chains after MFA
//!   challenges when both apply
//!
//! Completion always: issue session, enqueue audit event, delete the
//! transaction, return tokens.

use std::sync::Arc;

use audit::{AuditEvent, AuditPipeline};
use kernel::context::RequestContext;
use kernel::id::AuthTxId;
use platform::client::ClientFingerprint;
use platform::crypto::{constant_time_eq, random_digits, sha256, to_base64};
use platform::faststore::FastStore;
use platform::lock::IdempotencyGuard;
use platform::password::{ClearTextPassword, verify_dummy};
use platform::rate_limit::RateLimiter;
use serde::{Deserialize, Serialize};
use session::application::issue::{IssueSessionUseCase, IssuedSession};
use session::domain::repository::SessionRepository;

use crate::application::config::AuthConfig;
use crate::application::risk::{LOGIN_EMAIL_KIND, SecurityMonitor};
use crate::domain::entity::auth_tx::{AuthTx, AuthTxState, EnrollmentPayload, RiskSnapshot};
use crate::domain::entity::credential::Credential;
use crate::domain::entity::user::User;
use crate::domain::notifier::Notifier;
use crate::domain::repository::{
    AuthTxStore, BackupCodeConsumption, CredentialRepository, DeviceRepository, UserRepository,
};
use crate::domain::value_object::backup_codes::BackupCodeSet;
use crate::domain::value_object::email::Email;
use crate::domain::value_object::totp_secret::TotpSecret;
use crate::error::{AuthError, AuthResult};

/// Rate-limit kind for per-IP login counting
const LOGIN_IP_KIND: &str = "login:ip";

/// A secondary proof the client can present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMethod {
    Totp,
    BackupCode,
    TotpEnroll,
    EmailOtp,
}

impl ChallengeMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChallengeMethod::Totp => "totp",
            ChallengeMethod::BackupCode => "backup_code",
            ChallengeMethod::TotpEnroll => "totp_enroll",
            ChallengeMethod::EmailOtp => "email_otp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "totp" => Some(ChallengeMethod::Totp),
            "backup_code" => Some(ChallengeMethod::BackupCode),
            "totp_enroll" => Some(ChallengeMethod::TotpEnroll),
            "email_otp" => Some(ChallengeMethod::EmailOtp),
            _ => None,
        }
    }
}

/// Non-sensitive user projection returned on completed login
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub public_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            public_id: user.public_id.to_string(),
            email: user.email.to_string(),
            display_name: user.display_name.clone(),
            role: user.user_role.code().to_string(),
        }
    }
}

/// Enrollment material handed to the client exactly once
#[derive(Debug, Clone)]
pub struct EnrollmentChallenge {
    pub totp_secret: String,
    pub otpauth_url: String,
}

/// Result of `start_login` / `complete_challenge`. Exhaustively matched at
/// the DTO boundary; new variants must surface there.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Terminal success: tokens issued, transaction deleted
    Authenticated {
        tokens: IssuedSession,
        user: UserSummary,
        /// Present right after inline MFA enrollment
        backup_codes: Option<Vec<String>>,
    },
    /// A challenge must be answered via `complete_challenge`
    MfaRequired {
        auth_tx_id: AuthTxId,
        methods: Vec<ChallengeMethod>,
        expires_at_ms: i64,
        /// Present for the `totp_enroll` method
        enrollment: Option<EnrollmentChallenge>,
    },
    /// MFA is on but only backup codes can prove it
    BackupRequired {
        auth_tx_id: AuthTxId,
        methods: Vec<ChallengeMethod>,
        expires_at_ms: i64,
    },
}

/// The login flow service
pub struct AuthFlowService<R, T, SR, F, N>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync,
    T: AuthTxStore + Send + Sync,
    SR: SessionRepository + Send + Sync,
    F: FastStore + Sync,
    N: Notifier + Send + Sync,
{
    repo: Arc<R>,
    tx_store: Arc<T>,
    sessions: IssueSessionUseCase<SR, F>,
    limiter: Arc<RateLimiter<F>>,
    monitor: SecurityMonitor<R, F>,
    idempotency: Arc<IdempotencyGuard<F>>,
    notifier: Arc<N>,
    pipeline: AuditPipeline,
    config: Arc<AuthConfig>,
}

impl<R, T, SR, F, N> AuthFlowService<R, T, SR, F, N>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync,
    T: AuthTxStore + Send + Sync,
    SR: SessionRepository + Send + Sync,
    F: FastStore + Sync,
    N: Notifier + Send + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<R>,
        tx_store: Arc<T>,
        sessions: IssueSessionUseCase<SR, F>,
        limiter: Arc<RateLimiter<F>>,
        idempotency: Arc<IdempotencyGuard<F>>,
        notifier: Arc<N>,
        pipeline: AuditPipeline,
        config: Arc<AuthConfig>,
    ) -> Self {
        let monitor = SecurityMonitor::new(repo.clone(), limiter.clone(), config.clone());
        Self {
            repo,
            tx_store,
            sessions,
            limiter,
            monitor,
            idempotency,
            notifier,
            pipeline,
            config,
        }
    }

    // ========================================================================
    // start_login
    // ========================================================================

    pub async fn start_login(
        &self,
        email_raw: &str,
        password_raw: String,
        fingerprint: &ClientFingerprint,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        self.check_rate_limits(email_raw, fingerprint).await?;

        let password = ClearTextPassword::for_verification(password_raw);

        // Unknown email and wrong password must be indistinguishable, in
        // timing as well as in the response.
        let Ok(email) = Email::new(email_raw) else {
            verify_dummy(&password, self.config.pepper());
            return self.reject_credentials(email_raw, ctx);
        };
        let Some(user) = self.repo.find_by_email(&email).await? else {
            verify_dummy(&password, self.config.pepper());
            return self.reject_credentials(email_raw, ctx);
        };

        if !user.can_login() {
            return Err(AuthError::AccountDisabled);
        }

        let mut credential = self
            .repo
            .find_by_user_id(&user.user_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credential record missing".to_string()))?;

        if credential.is_locked() {
            return Err(AuthError::AccountLocked);
        }

        if !credential
            .password_hash
            .verify(&password, self.config.pepper())
        {
            credential.record_failure();
            CredentialRepository::update(self.repo.as_ref(), &credential).await?;
            return self.reject_credentials(email_raw, ctx);
        }

        if credential.is_password_expired() {
            return Err(AuthError::PasswordExpired);
        }

        if credential.login_failed_count > 0 {
            credential.reset_failures();
            CredentialRepository::update(self.repo.as_ref(), &credential).await?;
        }

        let risk = self.monitor.evaluate(&user, fingerprint).await?;

        // Decision table
        if credential.mfa_enabled {
            return self
                .open_mfa_challenge(&user, &credential, fingerprint, risk)
                .await;
        }

        if user.mfa_mandated() {
            return self.open_enrollment_challenge(&user, fingerprint, risk).await;
        }

        if risk.requires_device_verification() {
            return self
                .open_device_challenge(&user, fingerprint, risk)
                .await;
        }

        // Trusted device, no MFA: one round trip
        self.finish_login(user, fingerprint, "password", None, ctx)
            .await
    }

    // ========================================================================
    // challenge_methods
    // ========================================================================

    /// Read-only view of the methods the transaction currently accepts
    pub async fn challenge_methods(
        &self,
        auth_tx_id: AuthTxId,
    ) -> AuthResult<Vec<ChallengeMethod>> {
        let tx = self
            .tx_store
            .get(auth_tx_id)
            .await?
            .ok_or(AuthError::AuthTxNotFound)?;

        let credential = self
            .repo
            .find_by_user_id(&tx.user_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credential record missing".to_string()))?;

        Ok(Self::methods_for(&tx, &credential))
    }

    // ========================================================================
    // complete_challenge
    // ========================================================================

    pub async fn complete_challenge(
        &self,
        auth_tx_id: AuthTxId,
        method: ChallengeMethod,
        code: &str,
        fingerprint: &ClientFingerprint,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        let mut tx = self
            .tx_store
            .get(auth_tx_id)
            .await?
            .ok_or(AuthError::AuthTxNotFound)?;

        // Transaction-theft defense: reject input from any other client
        // context before looking at the code.
        if !tx.binding_matches(fingerprint) {
            return Err(AuthError::AuthTxBindingMismatch);
        }

        // Count the attempt and persist the counter before verification, so
        // a crashed request still consumed its attempt.
        if let Err(cap_exceeded) = tx.record_attempt() {
            self.tx_store.delete(auth_tx_id).await?;
            self.pipeline.push(
                AuditEvent::LoginTransactionInvalidated {
                    user_id: tx.user_id.into_uuid(),
                    attempts: tx.challenge_attempts as u32,
                },
                ctx,
            );
            return Err(cap_exceeded);
        }
        self.tx_store.put(&tx, self.config.auth_tx_ttl).await?;

        let user = self
            .repo
            .find_by_id(&tx.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let mut credential = self
            .repo
            .find_by_user_id(&tx.user_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credential record missing".to_string()))?;

        if !Self::methods_for(&tx, &credential).contains(&method) {
            // The recovery screen deserves a precise error when the set ran dry
            if method == ChallengeMethod::BackupCode
                && tx.state == AuthTxState::ChallengeMfaRequired
                && credential.backup_codes.remaining() == 0
            {
                return Err(AuthError::NoBackupCodesAvailable);
            }
            return Err(AuthError::MethodNotAvailable(method.as_str().to_string()));
        }

        let mut issued_backup_codes = None;

        match method {
            ChallengeMethod::Totp => {
                let secret = credential.totp_secret.as_ref().ok_or(AuthError::MfaBroken)?;
                if !secret.verify(code, user.email.as_str())? {
                    return self.reject_challenge(&tx, method, ctx);
                }
            }
            ChallengeMethod::BackupCode => {
                let code_hash = BackupCodeSet::hash_code(code);
                match self
                    .repo
                    .consume_backup_code(&tx.user_id, &code_hash)
                    .await?
                {
                    BackupCodeConsumption::Consumed { remaining } => {
                        self.pipeline.push(
                            AuditEvent::BackupCodeConsumed {
                                user_id: tx.user_id.into_uuid(),
                                remaining,
                            },
                            ctx,
                        );
                        if remaining == 0 {
                            tracing::warn!(user_id = %tx.user_id, "Last backup code consumed");
                        }
                    }
                    BackupCodeConsumption::AlreadyUsed => {
                        self.audit_challenge_failure(&tx, method, ctx);
                        return Err(AuthError::BackupCodeAlreadyUsed);
                    }
                    BackupCodeConsumption::Unknown => {
                        self.audit_challenge_failure(&tx, method, ctx);
                        return Err(AuthError::InvalidBackupCode);
                    }
                }
            }
            ChallengeMethod::TotpEnroll => {
                let payload = tx
                    .enrollment
                    .as_ref()
                    .ok_or_else(|| AuthError::Internal("Enrollment payload missing".to_string()))?;
                let secret = TotpSecret::from_base32(payload.totp_secret_base32.clone())?;
                if !secret.verify(code, user.email.as_str())? {
                    return self.reject_challenge(&tx, method, ctx);
                }

                // Possession proven: the temporary secret becomes durable
                // now, together with a fresh backup code set.
                credential.enable_mfa(secret);
                let (set, codes) = BackupCodeSet::generate(self.config.backup_code_count);
                credential.replace_backup_codes(set);
                CredentialRepository::update(self.repo.as_ref(), &credential).await?;

                self.pipeline.push_batch(
                    vec![
                        AuditEvent::MfaEnrolled {
                            user_id: tx.user_id.into_uuid(),
                        },
                        AuditEvent::BackupCodesGenerated {
                            user_id: tx.user_id.into_uuid(),
                            count: codes.len() as u32,
                        },
                    ],
                    ctx,
                );
                issued_backup_codes = Some(codes);
            }
            ChallengeMethod::EmailOtp => {
                let expected = tx
                    .email_otp_hash
                    .as_ref()
                    .ok_or_else(|| AuthError::Internal("Device OTP missing".to_string()))?;
                let presented = to_base64(&sha256(code.trim().as_bytes()));
                if !constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
                    return self.reject_challenge(&tx, method, ctx);
                }

                let device = self
                    .repo
                    .record_seen(
                        &tx.user_id,
                        &fingerprint.device_hash,
                        fingerprint.ip_string(),
                    )
                    .await?;
                self.repo.mark_trusted(&device.device_id).await?;
                self.pipeline.push(
                    AuditEvent::DeviceVerified {
                        user_id: tx.user_id.into_uuid(),
                        device_id: device.device_id.into_uuid(),
                    },
                    ctx,
                );
            }
        }

        // A risky MFA login still has to prove the device; enrollment and
        // the device proof itself complete directly.
        let device_verification_pending = tx.risk.requires_device_verification()
            && matches!(method, ChallengeMethod::Totp | ChallengeMethod::BackupCode);

        if device_verification_pending {
            tx.advance(AuthTxState::ChallengeDeviceVerify)?;
            self.arm_device_otp(&mut tx, &user).await?;
            self.tx_store.put(&tx, self.config.auth_tx_ttl).await?;

            return Ok(LoginOutcome::MfaRequired {
                auth_tx_id: tx.auth_tx_id,
                methods: vec![ChallengeMethod::EmailOtp],
                expires_at_ms: self.tx_expiry_ms(&tx),
                enrollment: None,
            });
        }

        tx.advance(AuthTxState::Completed)?;

        // Exactly-once completion: a double-submitted response must not
        // issue two sessions. The first caller wins the key; any duplicate
        // sees the transaction as already gone.
        let completion_key = format!("authtx-complete:{}", tx.auth_tx_id);
        if !self
            .idempotency
            .check_and_set(&completion_key, self.config.auth_tx_ttl)
            .await?
        {
            return Err(AuthError::AuthTxNotFound);
        }
        self.tx_store.delete(tx.auth_tx_id).await?;

        self.finish_login(user, fingerprint, method.as_str(), issued_backup_codes, ctx)
            .await
    }

    // ========================================================================
    // Challenge construction
    // ========================================================================

    async fn open_mfa_challenge(
        &self,
        user: &User,
        credential: &Credential,
        fingerprint: &ClientFingerprint,
        risk: RiskSnapshot,
    ) -> AuthResult<LoginOutcome> {
        let tx = AuthTx::new(
            user.user_id,
            AuthTxState::ChallengeMfaRequired,
            fingerprint,
            risk,
        );
        self.tx_store.put(&tx, self.config.auth_tx_ttl).await?;

        if credential.totp_secret.is_some() {
            let mut methods = vec![ChallengeMethod::Totp];
            if credential.backup_codes.remaining() > 0 {
                methods.push(ChallengeMethod::BackupCode);
            }
            return Ok(LoginOutcome::MfaRequired {
                auth_tx_id: tx.auth_tx_id,
                methods,
                expires_at_ms: self.tx_expiry_ms(&tx),
                enrollment: None,
            });
        }

        if credential.backup_codes.remaining() > 0 {
            // Secret lost but recovery codes remain: backup-only login
            return Ok(LoginOutcome::BackupRequired {
                auth_tx_id: tx.auth_tx_id,
                methods: vec![ChallengeMethod::BackupCode],
                expires_at_ms: self.tx_expiry_ms(&tx),
            });
        }

        self.tx_store.delete(tx.auth_tx_id).await?;
        Err(AuthError::MfaBroken)
    }

    async fn open_enrollment_challenge(
        &self,
        user: &User,
        fingerprint: &ClientFingerprint,
        risk: RiskSnapshot,
    ) -> AuthResult<LoginOutcome> {
        let secret = TotpSecret::generate();
        let mut tx = AuthTx::new(
            user.user_id,
            AuthTxState::ChallengeMfaEnroll,
            fingerprint,
            risk,
        );
        tx.enrollment = Some(EnrollmentPayload {
            totp_secret_base32: secret.as_base32().to_string(),
        });
        self.tx_store.put(&tx, self.config.auth_tx_ttl).await?;

        tracing::info!(user_id = %user.user_id, "MFA enrollment required at login");

        Ok(LoginOutcome::MfaRequired {
            auth_tx_id: tx.auth_tx_id,
            methods: vec![ChallengeMethod::TotpEnroll],
            expires_at_ms: self.tx_expiry_ms(&tx),
            enrollment: Some(EnrollmentChallenge {
                totp_secret: secret.as_base32().to_string(),
                otpauth_url: secret.get_otpauth_url(user.email.as_str())?,
            }),
        })
    }

    async fn open_device_challenge(
        &self,
        user: &User,
        fingerprint: &ClientFingerprint,
        risk: RiskSnapshot,
    ) -> AuthResult<LoginOutcome> {
        let mut tx = AuthTx::new(
            user.user_id,
            AuthTxState::ChallengeDeviceVerify,
            fingerprint,
            risk,
        );
        self.arm_device_otp(&mut tx, user).await?;
        self.tx_store.put(&tx, self.config.auth_tx_ttl).await?;

        Ok(LoginOutcome::MfaRequired {
            auth_tx_id: tx.auth_tx_id,
            methods: vec![ChallengeMethod::EmailOtp],
            expires_at_ms: self.tx_expiry_ms(&tx),
            enrollment: None,
        })
    }

    /// Generate the emailed one-time code, store its hash on the
    /// transaction, and dispatch it through the notifier
    async fn arm_device_otp(&self, tx: &mut AuthTx, user: &User) -> AuthResult<()> {
        let code = random_digits(self.config.device_otp_digits);
        tx.email_otp_hash = Some(to_base64(&sha256(code.as_bytes())));
        self.notifier
            .send_device_verification(&user.email, &code)
            .await
    }

    // ========================================================================
    // Completion and failure paths
    // ========================================================================

    async fn finish_login(
        &self,
        mut user: User,
        fingerprint: &ClientFingerprint,
        method: &str,
        backup_codes: Option<Vec<String>>,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        let ctx = ctx.clone().with_user(user.user_id);

        self.repo
            .record_seen(
                &user.user_id,
                &fingerprint.device_hash,
                fingerprint.ip_string(),
            )
            .await?;

        let tokens = self
            .sessions
            .execute(user.user_id, user.user_role, fingerprint, &ctx)
            .await?;

        self.pipeline.push(
            AuditEvent::LoginSucceeded {
                user_id: user.user_id.into_uuid(),
                method: method.to_string(),
            },
            &ctx,
        );

        user.record_login();
        UserRepository::update(self.repo.as_ref(), &user).await?;

        tracing::info!(
            user_id = %user.user_id,
            session_id = %tokens.session_id,
            method = method,
            "Login completed"
        );

        Ok(LoginOutcome::Authenticated {
            tokens,
            user: UserSummary::from(&user),
            backup_codes,
        })
    }

    fn reject_credentials(&self, email_raw: &str, ctx: &RequestContext) -> AuthResult<LoginOutcome> {
        self.pipeline.push(
            AuditEvent::LoginFailed {
                email_hash: Email::audit_hash_raw(email_raw),
            },
            ctx,
        );
        Err(AuthError::InvalidCredentials)
    }

    fn reject_challenge(
        &self,
        tx: &AuthTx,
        method: ChallengeMethod,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        self.audit_challenge_failure(tx, method, ctx);
        Err(AuthError::InvalidOtp)
    }

    fn audit_challenge_failure(&self, tx: &AuthTx, method: ChallengeMethod, ctx: &RequestContext) {
        self.pipeline.push(
            AuditEvent::ChallengeFailed {
                user_id: tx.user_id.into_uuid(),
                method: method.as_str().to_string(),
            },
            ctx,
        );
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn check_rate_limits(
        &self,
        email_raw: &str,
        fingerprint: &ClientFingerprint,
    ) -> AuthResult<()> {
        if let Some(ip) = fingerprint.ip_string() {
            let decision = self
                .limiter
                .check(LOGIN_IP_KIND, &ip, &self.config.ip_rate_limit)
                .await?;
            if !decision.allowed {
                return Err(AuthError::RateLimited);
            }
        }

        let email_key = email_raw.trim().to_lowercase();
        let decision = self
            .limiter
            .check(LOGIN_EMAIL_KIND, &email_key, &self.config.email_rate_limit)
            .await?;
        if !decision.allowed {
            return Err(AuthError::RateLimited);
        }

        Ok(())
    }

    fn methods_for(tx: &AuthTx, credential: &Credential) -> Vec<ChallengeMethod> {
        match tx.state {
            AuthTxState::ChallengeMfaRequired => {
                let mut methods = Vec::new();
                if credential.totp_secret.is_some() {
                    methods.push(ChallengeMethod::Totp);
                }
                if credential.backup_codes.remaining() > 0 {
                    methods.push(ChallengeMethod::BackupCode);
                }
                methods
            }
            AuthTxState::ChallengeMfaEnroll => vec![ChallengeMethod::TotpEnroll],
            AuthTxState::ChallengeDeviceVerify => vec![ChallengeMethod::EmailOtp],
            AuthTxState::PasswordVerified | AuthTxState::Completed => Vec::new(),
        }
    }

    fn tx_expiry_ms(&self, tx: &AuthTx) -> i64 {
        tx.created_at_ms + self.config.auth_tx_ttl_ms()
    }
}
