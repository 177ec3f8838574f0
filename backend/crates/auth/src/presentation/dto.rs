//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use session::application::issue::IssuedSession;

use crate::application::flow::{
    ChallengeMethod, EnrollmentChallenge, LoginOutcome, UserSummary,
};

// ============================================================================
// Login
// ============================================================================

/// Login request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token pair issued on completed login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairDoc {
    pub session_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: i64,
}

impl From<IssuedSession> for TokenPairDoc {
    fn from(tokens: IssuedSession) -> Self {
        Self {
            session_id: tokens.session_id.into_uuid(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at_ms: tokens.expires_at_ms,
        }
    }
}

/// User summary on completed login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    pub public_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

impl From<UserSummary> for UserDoc {
    fn from(user: UserSummary) -> Self {
        Self {
            public_id: user.public_id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
        }
    }
}

/// Enrollment material (shown exactly once)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentDoc {
    pub totp_secret: String,
    pub otpauth_url: String,
}

impl From<EnrollmentChallenge> for EnrollmentDoc {
    fn from(enrollment: EnrollmentChallenge) -> Self {
        Self {
            totp_secret: enrollment.totp_secret,
            otpauth_url: enrollment.otpauth_url,
        }
    }
}

/// Pending challenge description
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDoc {
    pub auth_tx_id: Uuid,
    pub methods: Vec<ChallengeMethod>,
    pub expires_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<EnrollmentDoc>,
}

/// Login response, discriminated by `status`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    #[serde(rename_all = "camelCase")]
    Authenticated {
        tokens: TokenPairDoc,
        user: UserDoc,
        #[serde(skip_serializing_if = "Option::is_none")]
        backup_codes: Option<Vec<String>>,
    },
    #[serde(rename_all = "camelCase")]
    MfaRequired { challenge: ChallengeDoc },
    #[serde(rename_all = "camelCase")]
    BackupRequired { challenge: ChallengeDoc },
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        // Exhaustive on purpose: a new outcome variant must decide its wire
        // shape here before it compiles.
        match outcome {
            LoginOutcome::Authenticated {
                tokens,
                user,
                backup_codes,
            } => LoginResponse::Authenticated {
                tokens: tokens.into(),
                user: user.into(),
                backup_codes,
            },
            LoginOutcome::MfaRequired {
                auth_tx_id,
                methods,
                expires_at_ms,
                enrollment,
            } => LoginResponse::MfaRequired {
                challenge: ChallengeDoc {
                    auth_tx_id: auth_tx_id.into_uuid(),
                    methods,
                    expires_at_ms,
                    enrollment: enrollment.map(EnrollmentDoc::from),
                },
            },
            LoginOutcome::BackupRequired {
                auth_tx_id,
                methods,
                expires_at_ms,
            } => LoginResponse::BackupRequired {
                challenge: ChallengeDoc {
                    auth_tx_id: auth_tx_id.into_uuid(),
                    methods,
                    expires_at_ms,
                    enrollment: None,
                },
            },
        }
    }
}

// ============================================================================
// Challenge
// ============================================================================

/// Challenge submission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub auth_tx_id: Uuid,
    pub method: String,
    pub code: String,
}

/// Available methods for a pending transaction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeMethodsResponse {
    pub available_methods: Vec<ChallengeMethod>,
}

// ============================================================================
// MFA Setup
// ============================================================================

/// MFA setup response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaSetupResponse {
    pub mfa_token: String,
    pub totp_secret: String,
    pub otpauth_url: String,
    /// QR code as base64-encoded PNG
    pub qr_code: String,
}

/// MFA setup confirmation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaConfirmRequest {
    pub mfa_token: String,
    pub otp: String,
}

// ============================================================================
// Backup Codes
// ============================================================================

/// Backup code generation request (step-up TOTP)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupGenerateRequest {
    pub otp: String,
}

/// Backup code generation response (plaintext shown exactly once)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupGenerateResponse {
    pub codes: Vec<String>,
}

/// Backup code login submission. `mfa_token` is the login transaction id
/// issued by `/auth/login`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupVerifyRequest {
    pub mfa_token: Uuid,
    pub backup_code: String,
}

/// Remaining-count response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRemainingResponse {
    pub remaining: u32,
    pub total: u32,
}
