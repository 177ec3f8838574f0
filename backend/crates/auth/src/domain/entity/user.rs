//! User Entity
//!
//! The auth-relevant slice of a user. Financial profile data lives with the
//! CRUD domain and never enters this crate.

use chrono::{DateTime, Utc};

use kernel::id::UserId;
use kernel::principal::UserRole;

use crate::domain::value_object::{email::Email, public_id::PublicId, user_status::UserStatus};

/// User entity
#[derive(Debug, Clone)]
pub struct User {
    /// Internal id (never exposed over the API)
    pub user_id: UserId,
    /// Public ID for API responses
    pub public_id: PublicId,
    /// Login identifier
    pub email: Email,
    /// Display name
    pub display_name: String,
    /// Role (drives permissions and the MFA mandate)
    pub user_role: UserRole,
    /// Account status
    pub user_status: UserStatus,
    /// Last successful login
    pub last_login_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user
    pub fn new(email: Email, display_name: impl Into<String>, user_role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            user_id: UserId::new(),
            public_id: PublicId::new(),
            email,
            display_name: display_name.into(),
            user_role,
            user_status: UserStatus::Active,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account may log in at all
    pub fn can_login(&self) -> bool {
        self.user_status.can_login()
    }

    /// Role policy: elevated roles may not log in without MFA enrollment
    pub fn mfa_mandated(&self) -> bool {
        self.user_role.mandates_mfa()
    }

    /// Record a successful login
    pub fn record_login(&mut self) {
        let now = Utc::now();
        self.last_login_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User::new(Email::new("user@example.com").unwrap(), "Alice", role)
    }

    #[test]
    fn test_new_user_can_login() {
        let user = user(UserRole::User);
        assert!(user.can_login());
        assert!(!user.mfa_mandated());
        assert!(user.last_login_at.is_none());
    }

    #[test]
    fn test_disabled_user_cannot_login() {
        let mut user = user(UserRole::User);
        user.user_status = UserStatus::Disabled;
        assert!(!user.can_login());
    }

    #[test]
    fn test_elevated_roles_mandate_mfa() {
        assert!(user(UserRole::Support).mfa_mandated());
        assert!(user(UserRole::Admin).mfa_mandated());
    }

    #[test]
    fn test_record_login() {
        let mut user = user(UserRole::User);
        user.record_login();
        assert!(user.last_login_at.is_some());
    }
}
