//! Credential Entity
//!
//! Authentication secrets for a user, separated from the User entity to
//! isolate sensitive data: password hash, TOTP secret, backup codes, and
//! failure/lockout counters.

use chrono::{DateTime, Duration, Utc};

use kernel::id::UserId;
use platform::password::HashedPassword;

use crate::domain::value_object::{backup_codes::BackupCodeSet, totp_secret::TotpSecret};

/// Credential entity
#[derive(Debug, Clone)]
pub struct Credential {
    /// Reference to User
    pub user_id: UserId,
    /// Hashed password (PHC string, peppered)
    pub password_hash: HashedPassword,
    /// Password lifetime bound, when rotation is enforced
    pub password_expires_at: Option<DateTime<Utc>>,
    /// Whether MFA is enabled for this account
    pub mfa_enabled: bool,
    /// TOTP secret; null unless enrolled
    pub totp_secret: Option<TotpSecret>,
    /// Single-use recovery codes
    pub backup_codes: BackupCodeSet,
    /// Consecutive login failure count
    pub login_failed_count: u16,
    /// Last login failure time
    pub last_failed_at: Option<DateTime<Utc>>,
    /// Account locked until (temporary lockout after failures)
    pub locked_until: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Maximum login failures before temporary lockout
    pub const MAX_LOGIN_FAILURES: u16 = 5;
    /// Lockout duration in minutes
    pub const LOCKOUT_MINUTES: i64 = 15;

    /// Create new credentials
    pub fn new(user_id: UserId, password_hash: HashedPassword) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            password_hash,
            password_expires_at: None,
            mfa_enabled: false,
            totp_secret: None,
            backup_codes: BackupCodeSet::default(),
            login_failed_count: 0,
            last_failed_at: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account is currently locked
    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some_and(|until| Utc::now() < until)
    }

    /// Check if the password lifetime has lapsed
    pub fn is_password_expired(&self) -> bool {
        self.password_expires_at
            .is_some_and(|expires| Utc::now() >= expires)
    }

    /// Record a failed login attempt
    pub fn record_failure(&mut self) {
        let now = Utc::now();
        self.login_failed_count += 1;
        self.last_failed_at = Some(now);
        self.updated_at = now;

        // Lock account after too many failures
        if self.login_failed_count >= Self::MAX_LOGIN_FAILURES {
            self.locked_until = Some(now + Duration::minutes(Self::LOCKOUT_MINUTES));
        }
    }

    /// Reset login failure count on successful password verification
    pub fn reset_failures(&mut self) {
        self.login_failed_count = 0;
        self.last_failed_at = None;
        self.locked_until = None;
        self.updated_at = Utc::now();
    }

    /// Promote a verified TOTP secret to permanent and enable MFA.
    /// Called only after the user proved possession with a correct code.
    pub fn enable_mfa(&mut self, secret: TotpSecret) {
        self.totp_secret = Some(secret);
        self.mfa_enabled = true;
        self.updated_at = Utc::now();
    }

    /// Replace the backup code set; regeneration invalidates old codes
    pub fn replace_backup_codes(&mut self, set: BackupCodeSet) {
        self.backup_codes = set;
        self.updated_at = Utc::now();
    }

    /// MFA is enabled and the secret is present
    pub fn mfa_usable(&self) -> bool {
        self.mfa_enabled && self.totp_secret.is_some()
    }

    /// MFA flagged on but the secret is gone - a data-integrity fault
    pub fn mfa_broken(&self) -> bool {
        self.mfa_enabled && self.totp_secret.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::password::ClearTextPassword;

    fn credential() -> Credential {
        let hash = ClearTextPassword::for_verification("Sup3r#Secret!".to_string())
            .hash(None)
            .unwrap();
        Credential::new(UserId::new(), hash)
    }

    #[test]
    fn test_new_credential_state() {
        let cred = credential();
        assert!(!cred.is_locked());
        assert!(!cred.is_password_expired());
        assert!(!cred.mfa_usable());
        assert!(!cred.mfa_broken());
        assert!(cred.backup_codes.is_empty());
    }

    #[test]
    fn test_lockout_after_max_failures() {
        let mut cred = credential();
        for _ in 0..Credential::MAX_LOGIN_FAILURES - 1 {
            cred.record_failure();
            assert!(!cred.is_locked());
        }
        cred.record_failure();
        assert!(cred.is_locked());

        cred.reset_failures();
        assert!(!cred.is_locked());
        assert_eq!(cred.login_failed_count, 0);
    }

    #[test]
    fn test_password_expiry() {
        let mut cred = credential();
        cred.password_expires_at = Some(Utc::now() - Duration::days(1));
        assert!(cred.is_password_expired());

        cred.password_expires_at = Some(Utc::now() + Duration::days(30));
        assert!(!cred.is_password_expired());
    }

    #[test]
    fn test_enable_mfa() {
        let mut cred = credential();
        cred.enable_mfa(TotpSecret::generate());
        assert!(cred.mfa_usable());
        assert!(!cred.mfa_broken());
    }

    #[test]
    fn test_mfa_broken_detection() {
        let mut cred = credential();
        cred.mfa_enabled = true;
        cred.totp_secret = None;
        assert!(cred.mfa_broken());
        assert!(!cred.mfa_usable());
    }
}
