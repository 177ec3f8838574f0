//! Audit Error Types

use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Audit-specific result type alias
pub type AuditResult<T> = Result<T, AuditError>;

/// Audit-specific error variants
#[derive(Debug, Error)]
pub enum AuditError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::Database(_) | AuditError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    pub fn to_app_error(&self) -> AppError {
        AppError::new(self.kind(), "Audit log operation failed").with_code("INTERNAL_ERROR")
    }
}

impl IntoResponse for AuditError {
    fn into_response(self) -> Response {
        match &self {
            AuditError::Database(e) => {
                tracing::error!(error = %e, "Audit database error");
            }
            AuditError::Internal(msg) => {
                tracing::error!(message = %msg, "Audit internal error");
            }
        }
        self.to_app_error().into_response()
    }
}
