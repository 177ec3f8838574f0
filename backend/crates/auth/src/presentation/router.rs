//! Auth Routers
//!
//! Two routers with the same state: the anonymous login flow and the
//! MFA-management routes the caller must wrap in the session middleware.

use axum::{
    Router,
    routing::{get, post},
};

use platform::faststore::FastStore;
use session::domain::repository::SessionRepository;

use crate::domain::notifier::Notifier;
use crate::domain::repository::{
    AuthTxStore, CredentialRepository, DeviceRepository, EnrollmentStore, UserRepository,
};
use crate::presentation::handlers::{self, AuthAppState};

/// Anonymous login-flow routes, mounted under `/auth`
pub fn auth_router<R, T, E, SR, F, N>(state: AuthAppState<R, T, E, SR, F, N>) -> Router
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    Router::new()
        .route("/login", post(handlers::login::<R, T, E, SR, F, N>))
        .route(
            "/login/challenge",
            post(handlers::login_challenge::<R, T, E, SR, F, N>),
        )
        .route(
            "/challenge/{auth_tx_id}/methods",
            get(handlers::challenge_methods::<R, T, E, SR, F, N>),
        )
        .route(
            "/mfa/backup-codes/verify",
            post(handlers::backup_code_verify::<R, T, E, SR, F, N>),
        )
        .with_state(state)
}

/// MFA management routes behind `require_session`. Paths are spelled out in
/// full so this router merges with the anonymous one under `/auth` without
/// any wildcard overlap.
pub fn auth_mfa_router<R, T, E, SR, F, N>(state: AuthAppState<R, T, E, SR, F, N>) -> Router
where
    R: UserRepository + CredentialRepository + DeviceRepository + Send + Sync + 'static,
    T: AuthTxStore + Send + Sync + 'static,
    E: EnrollmentStore + Send + Sync + 'static,
    SR: SessionRepository + Send + Sync + 'static,
    F: FastStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/mfa/setup/request",
            post(handlers::mfa_setup_request::<R, T, E, SR, F, N>),
        )
        .route(
            "/mfa/setup/confirm",
            post(handlers::mfa_setup_confirm::<R, T, E, SR, F, N>),
        )
        .route(
            "/mfa/backup-codes/generate",
            post(handlers::backup_codes_generate::<R, T, E, SR, F, N>),
        )
        .route(
            "/mfa/backup-codes/remaining",
            get(handlers::backup_codes_remaining::<R, T, E, SR, F, N>),
        )
        .with_state(state)
}
