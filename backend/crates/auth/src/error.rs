//! Auth Error Types
//!
//! This module provides auth-specific error variants that integrate with
//! the unified `kernel::error::AppError` system. Every client-visible
//! variant carries a stable wire code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong password or unknown account; deliberately indistinguishable
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account is locked (too many failed attempts)
    #[error("Account is temporarily locked")]
    AccountLocked,

    /// Account is disabled
    #[error("Account is disabled")]
    AccountDisabled,

    /// Password lifetime has lapsed; a reset is required
    #[error("Password has expired")]
    PasswordExpired,

    /// Invalid one-time code
    #[error("Invalid one-time code")]
    InvalidOtp,

    /// Backup code not part of the stored set
    #[error("Invalid backup code")]
    InvalidBackupCode,

    /// Backup code was already consumed
    #[error("Backup code has already been used")]
    BackupCodeAlreadyUsed,

    /// Backup flow requested but no codes exist
    #[error("No backup codes available")]
    NoBackupCodesAvailable,

    /// Operation requires MFA to be enabled
    #[error("Multi-factor authentication is not enabled")]
    MfaNotEnabled,

    /// Enrollment requested but MFA is already set up
    #[error("Multi-factor authentication is already set up")]
    MfaAlreadySetup,

    /// MFA flagged on but the secret is missing and no backup codes remain.
    /// A data-integrity fault, not a user error.
    #[error("Multi-factor authentication state is corrupted")]
    MfaBroken,

    /// Login transaction unknown or expired; restart from login
    #[error("Login transaction not found or expired")]
    AuthTxNotFound,

    /// Login transaction presented from a different client context
    #[error("Login transaction does not match this client")]
    AuthTxBindingMismatch,

    /// Challenge attempt cap exceeded; the transaction has been invalidated
    #[error("Too many challenge attempts, restart login")]
    TooManyAttempts,

    /// Challenge method not available in the current state
    #[error("Challenge method not available: {0}")]
    MethodNotAvailable(String),

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Request failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing required header
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// Rate limit exceeded
    #[error("Too many requests")]
    RateLimited,

    /// Session subsystem error
    #[error(transparent)]
    Session(#[from] session::SessionError),

    /// Fast store error
    #[error("Fast store error: {0}")]
    Store(#[from] platform::faststore::StoreError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidOtp
            | AuthError::InvalidBackupCode
            | AuthError::BackupCodeAlreadyUsed
            | AuthError::AuthTxBindingMismatch => StatusCode::UNAUTHORIZED,
            AuthError::AccountLocked => StatusCode::LOCKED,
            AuthError::AccountDisabled | AuthError::PasswordExpired => StatusCode::FORBIDDEN,
            AuthError::AuthTxNotFound | AuthError::TooManyAttempts => StatusCode::GONE,
            AuthError::NoBackupCodesAvailable | AuthError::MfaNotEnabled => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AuthError::MfaAlreadySetup => StatusCode::CONFLICT,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::MethodNotAvailable(_)
            | AuthError::Validation(_)
            | AuthError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Session(e) => e.status_code(),
            AuthError::MfaBroken
            | AuthError::Store(_)
            | AuthError::Database(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidOtp
            | AuthError::InvalidBackupCode
            | AuthError::BackupCodeAlreadyUsed
            | AuthError::AuthTxBindingMismatch => ErrorKind::Unauthorized,
            AuthError::AccountLocked => ErrorKind::Locked,
            AuthError::AccountDisabled | AuthError::PasswordExpired => ErrorKind::Forbidden,
            AuthError::AuthTxNotFound | AuthError::TooManyAttempts => ErrorKind::Gone,
            AuthError::NoBackupCodesAvailable | AuthError::MfaNotEnabled => {
                ErrorKind::UnprocessableEntity
            }
            AuthError::MfaAlreadySetup => ErrorKind::Conflict,
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::MethodNotAvailable(_)
            | AuthError::Validation(_)
            | AuthError::MissingHeader(_) => ErrorKind::BadRequest,
            AuthError::RateLimited => ErrorKind::TooManyRequests,
            AuthError::Session(e) => e.kind(),
            AuthError::MfaBroken
            | AuthError::Store(_)
            | AuthError::Database(_)
            | AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Stable wire code clients branch on
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AccountLocked => "ACCOUNT_LOCKED",
            AuthError::AccountDisabled => "ACCOUNT_DISABLED",
            AuthError::PasswordExpired => "PASSWORD_EXPIRED",
            AuthError::InvalidOtp => "INVALID_OTP",
            AuthError::InvalidBackupCode => "INVALID_BACKUP_CODE",
            AuthError::BackupCodeAlreadyUsed => "BACKUP_CODE_ALREADY_USED",
            AuthError::NoBackupCodesAvailable => "NO_BACKUP_CODES_AVAILABLE",
            AuthError::MfaNotEnabled => "MFA_NOT_ENABLED",
            AuthError::MfaAlreadySetup => "MFA_ALREADY_SETUP",
            AuthError::MfaBroken => "MFA_BROKEN",
            AuthError::AuthTxNotFound => "AUTH_TX_NOT_FOUND",
            AuthError::AuthTxBindingMismatch => "AUTH_TX_BINDING_MISMATCH",
            AuthError::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::MethodNotAvailable(_)
            | AuthError::Validation(_)
            | AuthError::MissingHeader(_) => "VALIDATION_ERROR",
            AuthError::RateLimited => "RATE_LIMITED",
            AuthError::Session(e) => e.code(),
            AuthError::Store(_) | AuthError::Database(_) | AuthError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Convert to AppError. Server errors get a generic client message; the
    /// detail stays in the logs.
    pub fn to_app_error(&self) -> AppError {
        let message = if self.kind().is_server_error() {
            "Authentication service error".to_string()
        } else {
            self.to_string()
        };
        AppError::new(self.kind(), message).with_code(self.code())
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Store(e) => {
                tracing::error!(error = %e, "Auth fast-store error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::MfaBroken => {
                tracing::error!("MFA enabled but secret missing and no backup codes remain");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::AccountLocked => {
                tracing::warn!("Login attempt on locked account");
            }
            AuthError::AuthTxBindingMismatch => {
                tracing::warn!("Login transaction binding mismatch detected");
            }
            AuthError::TooManyAttempts => {
                tracing::warn!("Login transaction invalidated after attempt cap");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<platform::client::FingerprintError> for AuthError {
    fn from(err: platform::client::FingerprintError) -> Self {
        match err {
            platform::client::FingerprintError::MissingHeader(header) => {
                AuthError::MissingHeader(header)
            }
        }
    }
}

impl From<platform::lock::LockError> for AuthError {
    fn from(err: platform::lock::LockError) -> Self {
        match err {
            platform::lock::LockError::Contended { key } => {
                AuthError::Internal(format!("Lock contended: {key}"))
            }
            platform::lock::LockError::Store(e) => AuthError::Store(e),
        }
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
