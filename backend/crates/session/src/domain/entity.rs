//! Session Entity
//!
//! Represents an authenticated user session resolved from a bearer token.

use chrono::{DateTime, Duration, Utc};

use kernel::id::{SessionId, UserId};
use kernel::principal::UserRole;

/// Session entity
#[derive(Debug, Clone)]
pub struct Session {
    /// Session ID (UUID v4, embedded in the access token)
    pub session_id: SessionId,
    /// Owning user
    pub user_id: UserId,
    /// Role snapshot at issuance
    pub user_role: UserRole,
    /// SHA-256 of the refresh token (the token itself is never stored)
    pub refresh_token_hash: Vec<u8>,
    /// Session expiration (Unix timestamp ms)
    pub expires_at_ms: i64,
    /// Monotonic revocation flag
    pub revoked: bool,
    /// Client binding hash (IP + User-Agent)
    pub client_fingerprint_hash: Vec<u8>,
    /// Client IP (for session management display)
    pub client_ip: Option<String>,
    /// User agent string (for session management display)
    pub user_agent: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session
    ///
    /// TTL is provided by the application layer (config), not hard-coded here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        user_role: UserRole,
        refresh_token_hash: Vec<u8>,
        fingerprint_hash: Vec<u8>,
        client_ip: Option<String>,
        user_agent: Option<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            session_id: SessionId::new(),
            user_id,
            user_role,
            refresh_token_hash,
            expires_at_ms: (now + ttl).timestamp_millis(),
            revoked: false,
            client_fingerprint_hash: fingerprint_hash,
            client_ip,
            user_agent,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Check if the session lifetime has lapsed
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() > self.expires_at_ms
    }

    /// Usable: neither revoked nor expired
    pub fn is_active(&self) -> bool {
        !self.revoked && !self.is_expired()
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(ttl: Duration) -> Session {
        Session::new(
            UserId::new(),
            UserRole::User,
            vec![0u8; 32],
            vec![1u8; 32],
            Some("10.0.0.1".to_string()),
            Some("test agent".to_string()),
            ttl,
        )
    }

    #[test]
    fn test_fresh_session_is_active() {
        let session = session(Duration::hours(12));
        assert!(!session.is_expired());
        assert!(session.is_active());
    }

    #[test]
    fn test_expired_session_is_not_active() {
        let session = session(Duration::milliseconds(-1));
        assert!(session.is_expired());
        assert!(!session.is_active());
    }

    #[test]
    fn test_revoked_session_is_not_active() {
        let mut session = session(Duration::hours(12));
        session.revoked = true;
        assert!(!session.is_active());
    }

    #[test]
    fn test_touch_advances_activity() {
        let mut session = session(Duration::hours(12));
        let before = session.last_activity_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        session.touch();
        assert!(session.last_activity_at > before);
    }
}
