//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository traits
//! - `application/` - The login state machine and MFA use cases
//! - `infra/` - Database and fast-store implementations
//! - `presentation/` - HTTP handlers, DTOs, router
//!
//! ## Features
//! - Password login with challenge escalation (TOTP, backup codes,
//!   device verification)
//! - Two-phase TOTP enrollment: the secret becomes durable only after the
//!   user proves possession with a correct code
//! - Single-use backup codes with atomic consumption
//! - Risk classification (new device / new IP / velocity) deciding which
//!   challenge a login must pass
//!
//! ## Security Model
//! - Passwords hashed with Argon2id plus a server-side pepper
//! - Login transactions are TTL-bound, bound to the client IP/UA hash, and
//!   invalidated outright when the challenge attempt cap is exceeded
//! - Credential failures are indistinguishable between unknown account and
//!   wrong password
//! - Automatic lockout after repeated failed logins

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;


// Re-exports for convenience
pub use application::config::AuthConfig;
pub use application::flow::AuthFlowService;
pub use error::{AuthError, AuthResult};
pub use infra::postgres::PgAuthRepository;
pub use presentation::router::auth_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};
