//! Session Error Types
//!
//! Session-specific error variants that integrate with the unified
//! `kernel::error::AppError` system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Session-specific result type alias
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific error variants
#[derive(Debug, Error)]
pub enum SessionError {
    /// Token malformed, unsigned, or pointing at a missing/revoked session
    #[error("Session not found or no longer valid")]
    SessionInvalid,

    /// Session exists but its lifetime has lapsed
    #[error("Session expired")]
    SessionExpired,

    /// Session bound to a different client context
    #[error("Session fingerprint mismatch")]
    FingerprintMismatch,

    /// Per-user issuance lock could not be taken
    #[error("Session issuance is contended, try again")]
    IssuanceContended,

    /// Missing required header
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// Pagination cursor failed to decode
    #[error("Invalid cursor")]
    InvalidCursor,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Fast store error
    #[error("Fast store error: {0}")]
    Store(#[from] platform::faststore::StoreError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::SessionInvalid
            | SessionError::SessionExpired
            | SessionError::FingerprintMismatch => StatusCode::UNAUTHORIZED,
            SessionError::IssuanceContended => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::MissingHeader(_) | SessionError::InvalidCursor => StatusCode::BAD_REQUEST,
            SessionError::Database(_) | SessionError::Store(_) | SessionError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::SessionInvalid
            | SessionError::SessionExpired
            | SessionError::FingerprintMismatch => ErrorKind::Unauthorized,
            SessionError::IssuanceContended => ErrorKind::ServiceUnavailable,
            SessionError::MissingHeader(_) | SessionError::InvalidCursor => ErrorKind::BadRequest,
            SessionError::Database(_) | SessionError::Store(_) | SessionError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// Stable wire code. Invalid, expired and mismatched sessions all read
    /// as an expired session externally; the distinction stays server-side.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::SessionInvalid
            | SessionError::SessionExpired
            | SessionError::FingerprintMismatch => "SESSION_EXPIRED",
            SessionError::IssuanceContended => "INTERNAL_ERROR",
            SessionError::MissingHeader(_) | SessionError::InvalidCursor => "VALIDATION_ERROR",
            SessionError::Database(_) | SessionError::Store(_) | SessionError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    pub fn to_app_error(&self) -> AppError {
        let message = if self.kind().is_server_error() {
            // Server-side detail stays in the logs
            "Session operation failed".to_string()
        } else {
            self.to_string()
        };
        AppError::new(self.kind(), message).with_code(self.code())
    }

    fn log(&self) {
        match self {
            SessionError::Database(e) => {
                tracing::error!(error = %e, "Session database error");
            }
            SessionError::Store(e) => {
                tracing::error!(error = %e, "Session fast-store error");
            }
            SessionError::Internal(msg) => {
                tracing::error!(message = %msg, "Session internal error");
            }
            SessionError::FingerprintMismatch => {
                tracing::warn!("Session fingerprint mismatch detected");
            }
            SessionError::IssuanceContended => {
                tracing::warn!("Session issuance lock contended");
            }
            _ => {
                tracing::debug!(error = %self, "Session error");
            }
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<platform::lock::LockError> for SessionError {
    fn from(err: platform::lock::LockError) -> Self {
        match err {
            platform::lock::LockError::Contended { .. } => SessionError::IssuanceContended,
            platform::lock::LockError::Store(e) => SessionError::Store(e),
        }
    }
}

impl From<platform::client::FingerprintError> for SessionError {
    fn from(err: platform::client::FingerprintError) -> Self {
        match err {
            platform::client::FingerprintError::MissingHeader(header) => {
                SessionError::MissingHeader(header)
            }
        }
    }
}
