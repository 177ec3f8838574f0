//! Email Value Object
//!
//! Validated, lowercased email address. Login identifies accounts by email;
//! audit entries only ever carry its hash.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AuthError;
use platform::crypto::{sha256, to_base64};

/// Maximum email length (per RFC 5321)
const EMAIL_MAX_LENGTH: usize = 254;
/// Maximum local-part length (per RFC 5321)
const LOCAL_MAX_LENGTH: usize = 64;

/// Email address value object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    /// Create a new email with validation (trims and lowercases)
    pub fn new(email: impl Into<String>) -> Result<Self, AuthError> {
        let email = email.into().trim().to_lowercase();

        if email.is_empty() || email.len() > EMAIL_MAX_LENGTH {
            return Err(AuthError::Validation("Invalid email".to_string()));
        }
        if !Self::is_valid_format(&email) {
            return Err(AuthError::Validation("Invalid email format".to_string()));
        }

        Ok(Self(email))
    }

    fn is_valid_format(email: &str) -> bool {
        let Some((local, domain)) = email.split_once('@') else {
            return false;
        };

        if local.is_empty() || local.len() > LOCAL_MAX_LENGTH || local.contains('@') {
            return false;
        }

        // Domain: dotted, alphanumeric/hyphen labels, no edge dots/hyphens
        if domain.is_empty() || !domain.contains('.') {
            return false;
        }
        if !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return false;
        }
        if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) {
            return false;
        }

        true
    }

    /// Create from database value (assumed already validated)
    pub fn from_db(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    /// Get the email as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash for audit entries; raw addresses never reach the audit log
    pub fn audit_hash(&self) -> String {
        to_base64(&sha256(self.0.as_bytes()))
    }

    /// Hash an unvalidated login identifier the same way, so failed lookups
    /// audit consistently with successful ones
    pub fn audit_hash_raw(raw: &str) -> String {
        to_base64(&sha256(raw.trim().to_lowercase().as_bytes()))
    }
}

impl FromStr for Email {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, AuthError> {
        Email::new(s)
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_valid() {
        assert!(Email::new("user@example.com").is_ok());
        assert!(Email::new("User@Example.COM").is_ok());
        assert!(Email::new("user.name@example.co.jp").is_ok());
        assert!(Email::new("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_email_invalid() {
        assert!(Email::new("").is_err());
        assert!(Email::new("userexample.com").is_err());
        assert!(Email::new("user@").is_err());
        assert!(Email::new("@example.com").is_err());
        assert!(Email::new("user@@example.com").is_err());
        assert!(Email::new("user@example").is_err());
        assert!(Email::new("user@-example.com").is_err());
    }

    #[test]
    fn test_email_case_normalization() {
        let email = Email::new("User@Example.COM").unwrap();
        assert_eq!(email.as_str(), "user@example.com");
    }

    #[test]
    fn test_audit_hash_matches_raw_form() {
        let email = Email::new("User@Example.COM ").unwrap();
        assert_eq!(email.audit_hash(), Email::audit_hash_raw("user@example.com"));
        assert_eq!(email.audit_hash(), Email::audit_hash_raw(" USER@example.com"));
        assert_ne!(email.audit_hash(), Email::audit_hash_raw("other@example.com"));
    }
}
