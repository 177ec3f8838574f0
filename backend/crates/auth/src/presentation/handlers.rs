//! HTTP Handlers

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::HeaderMap;
use std::sync::Arc;

use audit::AuditPipeline;
use kernel::context::RequestContext;
use kernel::id::AuthTxId;
use kernel::principal::CurrentUser;
use platform::client::{ClientFingerprint, extract_client_ip, extract_fingerprint};
use platform::faststore::FastStore;
use platform::lock::{IdempotencyGuard, LockManager};
use platform::rate_limit::RateLimiter;
use session::SessionConfig;
use session::application::issue::IssueSessionUseCase;
use session::domain::repository::SessionRepository;
use uuid::Uuid;

use crate::application::config::AuthConfig;
use crate::application::flow::{AuthFlowService, ChallengeMethod};
use crate::application::{BackupCodeUseCase, MfaSetupUseCase};
use crate::domain::notifier::Notifier;
use crate::domain::repository::{
    AuthTxStore, CredentialRepository, DeviceRepository, EnrollmentStore, UserRepository,
};
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    BackupGenerateRequest, BackupGenerateResponse, BackupRemainingResponse, BackupVerifyRequest,
    ChallengeMethodsResponse, ChallengeRequest, LoginRequest, LoginResponse, MfaConfirmRequest,
    MfaSetupResponse,
};

/// Shared state for auth handlers
///
/// Holds the building blocks; use cases are assembled per request from the
/// shared `Arc`s, the same way the repositories are injected into them.
pub struct AuthAppState<R, T, E, SR, F, N>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    pub repo: Arc<R>,
    pub tx_store: Arc<T>,
    pub enrollments: Arc<E>,
    pub session_repo: Arc<SR>,
    pub locks: Arc<LockManager<F>>,
    pub limiter: Arc<RateLimiter<F>>,
    pub idempotency: Arc<IdempotencyGuard<F>>,
    pub notifier: Arc<N>,
    pub pipeline: AuditPipeline,
    pub config: Arc<AuthConfig>,
    pub session_config: Arc<SessionConfig>,
}

impl<R, T, E, SR, F, N> Clone for AuthAppState<R, T, E, SR, F, N>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            tx_store: self.tx_store.clone(),
            enrollments: self.enrollments.clone(),
            session_repo: self.session_repo.clone(),
            locks: self.locks.clone(),
            limiter: self.limiter.clone(),
            idempotency: self.idempotency.clone(),
            notifier: self.notifier.clone(),
            pipeline: self.pipeline.clone(),
            config: self.config.clone(),
            session_config: self.session_config.clone(),
        }
    }
}

impl<R, T, E, SR, F, N> AuthAppState<R, T, E, SR, F, N>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    fn flow(&self) -> AuthFlowService<R, T, SR, F, N> {
        let sessions = IssueSessionUseCase::new(
            self.session_repo.clone(),
            self.locks.clone(),
            self.pipeline.clone(),
            self.session_config.clone(),
        );
        AuthFlowService::new(
            self.repo.clone(),
            self.tx_store.clone(),
            sessions,
            self.limiter.clone(),
            self.idempotency.clone(),
            self.notifier.clone(),
            self.pipeline.clone(),
            self.config.clone(),
        )
    }

    fn mfa_setup(&self) -> MfaSetupUseCase<R, E> {
        MfaSetupUseCase::new(
            self.repo.clone(),
            self.enrollments.clone(),
            self.pipeline.clone(),
            self.config.clone(),
        )
    }

    fn backup_codes(&self) -> BackupCodeUseCase<R> {
        BackupCodeUseCase::new(self.repo.clone(), self.pipeline.clone(), self.config.clone())
    }
}

// ============================================================================
// Login flow
// ============================================================================

/// POST /auth/login
pub async fn login<R, T, E, SR, F, N>(
    State(state): State<AuthAppState<R, T, E, SR, F, N>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    let fingerprint = fingerprint_from(&headers, Some(addr.ip()))?;
    let ctx = request_context(&headers, &fingerprint);

    let outcome = state
        .flow()
        .start_login(&req.email, req.password, &fingerprint, &ctx)
        .await?;

    Ok(Json(outcome.into()))
}

/// GET /auth/challenge/{authTxId}/methods
pub async fn challenge_methods<R, T, E, SR, F, N>(
    State(state): State<AuthAppState<R, T, E, SR, F, N>>,
    Path(auth_tx_id): Path<Uuid>,
) -> AuthResult<Json<ChallengeMethodsResponse>>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    let methods = state
        .flow()
        .challenge_methods(AuthTxId::from_uuid(auth_tx_id))
        .await?;

    Ok(Json(ChallengeMethodsResponse {
        available_methods: methods,
    }))
}

/// POST /auth/login/challenge
pub async fn login_challenge<R, T, E, SR, F, N>(
    State(state): State<AuthAppState<R, T, E, SR, F, N>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<ChallengeRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    let method = ChallengeMethod::parse(&req.method)
        .ok_or_else(|| AuthError::Validation(format!("Unknown challenge method: {}", req.method)))?;

    let fingerprint = fingerprint_from(&headers, Some(addr.ip()))?;
    let ctx = request_context(&headers, &fingerprint);

    let outcome = state
        .flow()
        .complete_challenge(
            AuthTxId::from_uuid(req.auth_tx_id),
            method,
            &req.code,
            &fingerprint,
            &ctx,
        )
        .await?;

    Ok(Json(outcome.into()))
}

/// POST /auth/mfa/backup-codes/verify
///
/// Alias of `/auth/login/challenge` with the backup-code method; kept for
/// clients that treat recovery as its own screen.
pub async fn backup_code_verify<R, T, E, SR, F, N>(
    State(state): State<AuthAppState<R, T, E, SR, F, N>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<BackupVerifyRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    let fingerprint = fingerprint_from(&headers, Some(addr.ip()))?;
    let ctx = request_context(&headers, &fingerprint);

    let outcome = state
        .flow()
        .complete_challenge(
            AuthTxId::from_uuid(req.mfa_token),
            ChallengeMethod::BackupCode,
            &req.backup_code,
            &fingerprint,
            &ctx,
        )
        .await?;

    Ok(Json(outcome.into()))
}

// ============================================================================
// MFA management (session required)
// ============================================================================

/// POST /auth/mfa/setup/request
pub async fn mfa_setup_request<R, T, E, SR, F, N>(
    State(state): State<AuthAppState<R, T, E, SR, F, N>>,
    Extension(current_user): Extension<CurrentUser>,
) -> AuthResult<Json<MfaSetupResponse>>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    let output = state.mfa_setup().request(&current_user).await?;

    Ok(Json(MfaSetupResponse {
        mfa_token: output.mfa_token,
        totp_secret: output.totp_secret,
        otpauth_url: output.otpauth_url,
        qr_code: output.qr_code,
    }))
}

/// POST /auth/mfa/setup/confirm
pub async fn mfa_setup_confirm<R, T, E, SR, F, N>(
    State(state): State<AuthAppState<R, T, E, SR, F, N>>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<MfaConfirmRequest>,
) -> AuthResult<axum::http::StatusCode>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    let ctx = authed_context(&headers, &current_user);
    state
        .mfa_setup()
        .confirm(&current_user, &req.mfa_token, &req.otp, &ctx)
        .await?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// POST /auth/mfa/backup-codes/generate
pub async fn backup_codes_generate<R, T, E, SR, F, N>(
    State(state): State<AuthAppState<R, T, E, SR, F, N>>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<BackupGenerateRequest>,
) -> AuthResult<Json<BackupGenerateResponse>>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    let ctx = authed_context(&headers, &current_user);
    let codes = state
        .backup_codes()
        .generate(&current_user, &req.otp, &ctx)
        .await?;

    Ok(Json(BackupGenerateResponse { codes }))
}

/// GET /auth/mfa/backup-codes/remaining
pub async fn backup_codes_remaining<R, T, E, SR, F, N>(
    State(state): State<AuthAppState<R, T, E, SR, F, N>>,
    Extension(current_user): Extension<CurrentUser>,
) -> AuthResult<Json<BackupRemainingResponse>>
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    let counts = state.backup_codes().remaining(&current_user).await?;

    Ok(Json(BackupRemainingResponse {
        remaining: counts.remaining,
        total: counts.total,
    }))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn fingerprint_from(
    headers: &HeaderMap,
    direct_ip: Option<std::net::IpAddr>,
) -> AuthResult<ClientFingerprint> {
    let client_ip = extract_client_ip(headers, direct_ip);
    Ok(extract_fingerprint(headers, client_ip)?)
}

/// Explicit request context for audit enrichment on anonymous routes
fn request_context(headers: &HeaderMap, fingerprint: &ClientFingerprint) -> RequestContext {
    let mut ctx = RequestContext::new()
        .with_client(fingerprint.ip, fingerprint.user_agent.clone());
    if let Some(request_id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_request_id(request_id);
    }
    if let Some(trace_id) = headers.get("x-trace-id").and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_trace_id(trace_id);
    }
    if let Some(correlation_id) = headers.get("x-correlation-id").and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_correlation_id(correlation_id);
    }

    ctx
}

/// Context for authenticated routes: client material comes from headers,
/// identity from the resolved session
fn authed_context(headers: &HeaderMap, current_user: &CurrentUser) -> RequestContext {
    let client_ip = extract_client_ip(headers, None);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut ctx = RequestContext::new()
        .with_user(current_user.user_id)
        .with_session(current_user.session_id)
        .with_client(client_ip, user_agent);

    if let Some(request_id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_request_id(request_id);
    }
    if let Some(trace_id) = headers.get("x-trace-id").and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_trace_id(trace_id);
    }

    ctx
}
