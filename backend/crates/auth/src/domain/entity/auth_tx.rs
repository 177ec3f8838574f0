//! Login Transaction Entity
//!
//! Ephemeral record tracking one login attempt through the challenge state
//! machine. Lives in the fast store under a TTL; it is deleted on
//! completion, on expiry, or when the challenge attempt cap is exceeded.

use serde::{Deserialize, Serialize};

use kernel::id::{AuthTxId, UserId};
use platform::client::ClientFingerprint;

use crate::error::{AuthError, AuthResult};

/// Cap on challenge attempts per transaction. Exceeding it invalidates the
/// transaction outright; there is no per-attempt retry beyond this point.
pub const MAX_CHALLENGE_ATTEMPTS: u8 = 5;

/// Login flow states. Transitions are monotonic in `rank`; `Completed` is
/// terminal and the record is deleted right after session issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthTxState {
    PasswordVerified,
    ChallengeMfaRequired,
    ChallengeMfaEnroll,
    ChallengeDeviceVerify,
    Completed,
}

impl AuthTxState {
    /// Position in the flow; transitions may never decrease it
    const fn rank(&self) -> u8 {
        match self {
            AuthTxState::PasswordVerified => 0,
            AuthTxState::ChallengeMfaRequired | AuthTxState::ChallengeMfaEnroll => 1,
            AuthTxState::ChallengeDeviceVerify => 2,
            AuthTxState::Completed => 3,
        }
    }
}

/// Risk classification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Outcome of the security monitor's heuristics, frozen into the
/// transaction at password verification time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub new_device: bool,
    pub new_ip: bool,
    pub velocity_suspicious: bool,
    pub level: RiskLevel,
}

impl RiskSnapshot {
    pub fn trusted() -> Self {
        Self {
            new_device: false,
            new_ip: false,
            velocity_suspicious: false,
            level: RiskLevel::Low,
        }
    }

    /// Whether this login must prove control of the account's email before
    /// it completes
    pub fn requires_device_verification(&self) -> bool {
        self.new_device || self.new_ip || self.level >= RiskLevel::Medium
    }
}

/// Temporary TOTP enrollment material, held only inside the transaction
/// until the user proves possession
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentPayload {
    pub totp_secret_base32: String,
}

/// Login transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTx {
    pub auth_tx_id: AuthTxId,
    pub user_id: UserId,
    pub state: AuthTxState,
    /// Base64 SHA-256 over client IP + User-Agent; input from any other
    /// client context is rejected
    pub binding_hash_b64: String,
    pub challenge_attempts: u8,
    pub risk: RiskSnapshot,
    /// Present only in `ChallengeMfaEnroll`
    pub enrollment: Option<EnrollmentPayload>,
    /// SHA-256 (base64) of the emailed one-time code, in `ChallengeDeviceVerify`
    pub email_otp_hash: Option<String>,
    pub created_at_ms: i64,
}

impl AuthTx {
    pub fn new(
        user_id: UserId,
        state: AuthTxState,
        fingerprint: &ClientFingerprint,
        risk: RiskSnapshot,
    ) -> Self {
        Self {
            auth_tx_id: AuthTxId::new(),
            user_id,
            state,
            binding_hash_b64: fingerprint.binding_hash_b64(),
            challenge_attempts: 0,
            risk,
            enrollment: None,
            email_otp_hash: None,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Check the presented client context against the stored binding
    pub fn binding_matches(&self, fingerprint: &ClientFingerprint) -> bool {
        platform::crypto::constant_time_eq(
            self.binding_hash_b64.as_bytes(),
            fingerprint.binding_hash_b64().as_bytes(),
        )
    }

    /// Count one challenge attempt. Returns Err once the cap is exceeded;
    /// the caller must then delete the transaction.
    pub fn record_attempt(&mut self) -> AuthResult<()> {
        self.challenge_attempts = self.challenge_attempts.saturating_add(1);
        if self.challenge_attempts > MAX_CHALLENGE_ATTEMPTS {
            return Err(AuthError::TooManyAttempts);
        }
        Ok(())
    }

    /// Transition to `next`, enforcing monotonicity
    pub fn advance(&mut self, next: AuthTxState) -> AuthResult<()> {
        if next.rank() < self.state.rank() {
            return Err(AuthError::Internal(format!(
                "Illegal login state transition: {:?} -> {next:?}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(seed: u8) -> ClientFingerprint {
        ClientFingerprint::new([seed; 32], [seed; 32], None, Some("agent".to_string()))
    }

    fn tx(state: AuthTxState) -> AuthTx {
        AuthTx::new(UserId::new(), state, &fingerprint(1), RiskSnapshot::trusted())
    }

    #[test]
    fn test_binding_matches_same_client_only() {
        let tx = tx(AuthTxState::ChallengeMfaRequired);
        assert!(tx.binding_matches(&fingerprint(1)));
        assert!(!tx.binding_matches(&fingerprint(2)));
    }

    #[test]
    fn test_attempt_cap() {
        let mut tx = tx(AuthTxState::ChallengeMfaRequired);
        for _ in 0..MAX_CHALLENGE_ATTEMPTS {
            tx.record_attempt().unwrap();
        }
        assert!(matches!(
            tx.record_attempt(),
            Err(AuthError::TooManyAttempts)
        ));
    }

    #[test]
    fn test_states_advance_monotonically() {
        let mut tx = tx(AuthTxState::PasswordVerified);
        tx.advance(AuthTxState::ChallengeMfaRequired).unwrap();
        tx.advance(AuthTxState::ChallengeDeviceVerify).unwrap();
        tx.advance(AuthTxState::Completed).unwrap();

        // Going backwards is a bug, not a request error
        let mut tx = super::AuthTx::new(
            UserId::new(),
            AuthTxState::ChallengeDeviceVerify,
            &fingerprint(1),
            RiskSnapshot::trusted(),
        );
        assert!(tx.advance(AuthTxState::PasswordVerified).is_err());
    }

    #[test]
    fn test_risk_snapshot_device_verification() {
        assert!(!RiskSnapshot::trusted().requires_device_verification());

        let new_device = RiskSnapshot {
            new_device: true,
            new_ip: false,
            velocity_suspicious: false,
            level: RiskLevel::Medium,
        };
        assert!(new_device.requires_device_verification());

        let velocity_only = RiskSnapshot {
            new_device: false,
            new_ip: false,
            velocity_suspicious: true,
            level: RiskLevel::High,
        };
        assert!(velocity_only.requires_device_verification());
    }

    #[test]
    fn test_serializes_roundtrip() {
        let mut tx = tx(AuthTxState::ChallengeMfaEnroll);
        tx.enrollment = Some(EnrollmentPayload {
            totp_secret_base32: "JBSWY3DPEHPK3PXP".to_string(),
        });

        let json = serde_json::to_string(&tx).unwrap();
        let restored: AuthTx = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.auth_tx_id, tx.auth_tx_id);
        assert_eq!(restored.state, tx.state);
        assert_eq!(
            restored.enrollment.unwrap().totp_secret_base32,
            "JBSWY3DPEHPK3PXP"
        );
    }
}
