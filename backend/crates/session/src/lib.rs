//! Session Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Session entity, repository trait
//! - `application/` - Issue/resolve/list/revoke use cases, token codec
//! - `infra/` - Database implementations
//! - `presentation/` - HTTP handlers, DTOs, router, bearer middleware
//!
//! ## Security Model
//! - Access tokens are HMAC-SHA256 signed session ids (bearer scheme)
//! - Refresh tokens are random 256-bit values, stored only as hashes
//! - Sessions are bound to the client fingerprint at issuance
//! - Revocation is monotonic; revoked sessions never resolve again
//! - Under the single-session policy, issuance revokes all prior sessions
//!   inside a per-user distributed lock

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use infra::postgres::PgSessionRepository;
pub use presentation::middleware::{SessionMiddlewareState, require_session};
pub use presentation::router::session_router;
