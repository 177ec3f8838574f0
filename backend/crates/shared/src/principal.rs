//! Authenticated Principal
//!
//! The role model and the `CurrentUser` value produced by the session
//! resolver and consumed by handlers and the policy engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::{SessionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i16)]
pub enum UserRole {
    #[default]
    User = 0,
    Support = 1,
    Admin = 2,
}

impl UserRole {
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        use UserRole::*;
        match self {
            User => "user",
            Support => "support",
            Admin => "admin",
        }
    }

    #[inline]
    pub const fn is_support_or_higher(&self) -> bool {
        use UserRole::*;
        matches!(self, Support | Admin)
    }

    #[inline]
    pub const fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Elevated roles must complete MFA enrollment before login finishes
    #[inline]
    pub const fn mandates_mfa(&self) -> bool {
        self.is_support_or_higher()
    }

    /// Permissions granted by this role
    pub fn permissions(&self) -> &'static [&'static str] {
        use UserRole::*;
        match self {
            User => &["session:list", "session:revoke", "mfa:manage"],
            Support => &["session:list", "session:revoke", "mfa:manage", "audit:read"],
            Admin => &[
                "session:list",
                "session:revoke",
                "session:revoke:any",
                "mfa:manage",
                "audit:read",
                "ratelimit:manage",
            ],
        }
    }

    #[inline]
    pub fn from_id(id: i16) -> Option<Self> {
        use UserRole::*;
        match id {
            0 => Some(User),
            1 => Some(Support),
            2 => Some(Admin),
            _ => None,
        }
    }

    #[inline]
    pub fn from_code(code: &str) -> Option<Self> {
        use UserRole::*;
        match code {
            "user" => Some(User),
            "support" => Some(Support),
            "admin" => Some(Admin),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Resolved caller identity for an authenticated request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub session_id: SessionId,
    /// Role snapshot taken at session issuance
    pub role: UserRole,
}

impl CurrentUser {
    pub fn new(user_id: UserId, session_id: SessionId, role: UserRole) -> Self {
        Self {
            user_id,
            session_id,
            role,
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.role.permissions().contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_from_id() {
        assert_eq!(UserRole::from_id(0), Some(UserRole::User));
        assert_eq!(UserRole::from_id(1), Some(UserRole::Support));
        assert_eq!(UserRole::from_id(2), Some(UserRole::Admin));
        assert_eq!(UserRole::from_id(9), None);
    }

    #[test]
    fn test_user_role_from_code() {
        assert_eq!(UserRole::from_code("user"), Some(UserRole::User));
        assert_eq!(UserRole::from_code("support"), Some(UserRole::Support));
        assert_eq!(UserRole::from_code("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_code("root"), None);
    }

    #[test]
    fn test_role_checks() {
        assert!(!UserRole::User.is_support_or_higher());
        assert!(UserRole::Support.is_support_or_higher());
        assert!(UserRole::Admin.is_support_or_higher());
        assert!(!UserRole::Support.is_admin());
        assert!(UserRole::Admin.is_admin());
    }

    #[test]
    fn test_mfa_mandate() {
        assert!(!UserRole::User.mandates_mfa());
        assert!(UserRole::Support.mandates_mfa());
        assert!(UserRole::Admin.mandates_mfa());
    }

    #[test]
    fn test_permissions() {
        let user = CurrentUser::new(UserId::new(), SessionId::new(), UserRole::User);
        assert!(user.has_permission("session:list"));
        assert!(!user.has_permission("audit:read"));

        let admin = CurrentUser::new(UserId::new(), SessionId::new(), UserRole::Admin);
        assert!(admin.has_permission("audit:read"));
        assert!(admin.has_permission("session:revoke:any"));
    }
}
