//! Application Configuration
//!
//! Configuration for the auth application layer.

use std::time::Duration;

use platform::rate_limit::RateLimitConfig;

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Server-side pepper folded into every password hash
    pub password_pepper: Option<Vec<u8>>,
    /// Lifetime of a login transaction in the fast store (10 minutes)
    pub auth_tx_ttl: Duration,
    /// Lifetime of a pending MFA enrollment token (10 minutes)
    pub enrollment_ttl: Duration,
    /// Login attempts per email address
    pub email_rate_limit: RateLimitConfig,
    /// Login attempts per client IP
    pub ip_rate_limit: RateLimitConfig,
    /// Window attempt count at which velocity becomes suspicious
    pub velocity_threshold: u32,
    /// Digits in the emailed device-verification code
    pub device_otp_digits: usize,
    /// Backup codes issued per generation
    pub backup_code_count: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_pepper: None,
            auth_tx_ttl: Duration::from_secs(10 * 60),
            enrollment_ttl: Duration::from_secs(10 * 60),
            email_rate_limit: RateLimitConfig::new(10, 15 * 60),
            ip_rate_limit: RateLimitConfig::new(30, 15 * 60),
            velocity_threshold: 5,
            device_otp_digits: 6,
            backup_code_count: 10,
        }
    }
}

impl AuthConfig {
    /// Create config with a random pepper (for development)
    pub fn development() -> Self {
        Self {
            password_pepper: Some(platform::crypto::random_bytes(32)),
            ..Default::default()
        }
    }

    /// Get password pepper as slice
    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }

    /// Transaction TTL in milliseconds (for challenge expiry responses)
    pub fn auth_tx_ttl_ms(&self) -> i64 {
        self.auth_tx_ttl.as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.auth_tx_ttl, Duration::from_secs(600));
        assert_eq!(config.backup_code_count, 10);
        assert_eq!(config.device_otp_digits, 6);
        assert!(config.pepper().is_none());
    }

    #[test]
    fn test_development_config_has_pepper() {
        let config = AuthConfig::development();
        assert!(config.pepper().is_some());
    }
}
