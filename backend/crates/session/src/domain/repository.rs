//! Repository Traits
//!
//! Interfaces for session persistence. Implementation is in the
//! infrastructure layer.

use chrono::{DateTime, Utc};

use crate::domain::entity::Session;
use crate::error::SessionResult;
use kernel::id::{SessionId, UserId};

/// Listing filter. Ownership scoping is enforced by the use case before the
/// filter reaches the repository.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub user_id: Option<UserId>,
    pub active_only: bool,
}

/// Keyset cursor: the (created_at, session_id) of the last row served.
/// Microsecond precision matches the database timestamp exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCursor {
    pub created_at_micros: i64,
    pub session_id: SessionId,
}

/// Session repository trait
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    /// Create a new session
    async fn create(&self, session: &Session) -> SessionResult<()>;

    /// Find session by ID, revoked or not
    async fn find_by_id(&self, session_id: SessionId) -> SessionResult<Option<Session>>;

    /// All active (unrevoked, unexpired) sessions for a user
    async fn find_active_by_user(&self, user_id: &UserId) -> SessionResult<Vec<Session>>;

    /// Update last activity
    async fn touch(&self, session_id: SessionId, at: DateTime<Utc>) -> SessionResult<()>;

    /// Revoke the user's active sessions, optionally restricted to `ids`.
    /// Returns the ids actually revoked; an empty result is a valid no-op.
    async fn revoke_for_user(
        &self,
        user_id: &UserId,
        ids: Option<&[SessionId]>,
    ) -> SessionResult<Vec<SessionId>>;

    /// Privileged bulk revocation without an ownership filter.
    /// Returns (owner, session) pairs for per-session audit entries.
    async fn revoke_many(&self, ids: &[SessionId]) -> SessionResult<Vec<(UserId, SessionId)>>;

    /// One page, newest first, starting strictly after `cursor`
    async fn list_page(
        &self,
        filter: &SessionFilter,
        cursor: Option<SessionCursor>,
        take: i64,
    ) -> SessionResult<Vec<Session>>;

    /// Delete sessions whose expiry passed the retention horizon
    async fn cleanup_expired(&self) -> SessionResult<u64>;
}
