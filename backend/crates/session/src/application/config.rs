//! Application Configuration
//!
//! Configuration for the session application layer.

use std::time::Duration;

/// Session application configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Secret key for HMAC-signing access tokens (32 bytes)
    pub token_secret: [u8; 32],
    /// Session TTL (12 hours)
    pub session_ttl: Duration,
    /// When enabled, issuing a session revokes all prior sessions of the
    /// user first (enumerate-revoke-issue inside a per-user lock)
    pub single_session: bool,
    /// TTL of the per-user issuance lock
    pub issue_lock_ttl: Duration,
    /// Issuance lock retry attempts before failing loudly
    pub issue_lock_attempts: u32,
    /// Fixed backoff between issuance lock attempts
    pub issue_lock_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_secret: [0u8; 32],
            session_ttl: Duration::from_secs(12 * 3600), // 12 hours
            single_session: false,
            issue_lock_ttl: Duration::from_secs(10),
            issue_lock_attempts: 5,
            issue_lock_backoff: Duration::from_millis(100),
        }
    }
}

impl SessionConfig {
    /// Create config with a random token secret (for development)
    pub fn with_random_secret() -> Self {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        Self {
            token_secret: secret,
            ..Default::default()
        }
    }

    /// Create config for development
    pub fn development() -> Self {
        Self::with_random_secret()
    }

    /// Get session TTL in milliseconds
    pub fn session_ttl_ms(&self) -> i64 {
        self.session_ttl.as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.session_ttl, Duration::from_secs(12 * 3600));
        assert!(!config.single_session);
        assert_eq!(config.issue_lock_attempts, 5);
    }

    #[test]
    fn test_with_random_secret() {
        let config1 = SessionConfig::with_random_secret();
        let config2 = SessionConfig::with_random_secret();

        assert_ne!(config1.token_secret, config2.token_secret);
        assert!(config1.token_secret.iter().any(|&b| b != 0));
    }
}
