//! Audit Log Entry
//!
//! One row per security-relevant event. The event payload is a closed enum:
//! every event type has a fixed shape, so downstream consumers can rely on
//! the fields they index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use kernel::context::RequestContext;
use kernel::id::LogId;

/// Severity of an audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warning,
    Security,
}

impl AuditLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Security => "security",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "info" => Some(AuditLevel::Info),
            "warning" => Some(AuditLevel::Warning),
            "security" => Some(AuditLevel::Security),
            _ => None,
        }
    }
}

/// Closed set of audited events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSucceeded {
        user_id: Uuid,
        method: String,
    },
    LoginFailed {
        /// SHA-256 of the attempted email; raw addresses never reach the log
        email_hash: String,
    },
    ChallengeFailed {
        user_id: Uuid,
        method: String,
    },
    LoginTransactionInvalidated {
        user_id: Uuid,
        attempts: u32,
    },
    MfaEnrolled {
        user_id: Uuid,
    },
    BackupCodesGenerated {
        user_id: Uuid,
        count: u32,
    },
    BackupCodeConsumed {
        user_id: Uuid,
        remaining: u32,
    },
    DeviceVerified {
        user_id: Uuid,
        device_id: Uuid,
    },
    SessionIssued {
        user_id: Uuid,
        session_id: Uuid,
    },
    SessionRevoked {
        user_id: Uuid,
        session_id: Uuid,
        by_admin: bool,
    },
    PermissionDenied {
        user_id: Uuid,
        detail: String,
    },
}

impl AuditEvent {
    /// Stable discriminator persisted alongside the payload
    pub const fn event_type(&self) -> &'static str {
        use AuditEvent::*;
        match self {
            LoginSucceeded { .. } => "login_succeeded",
            LoginFailed { .. } => "login_failed",
            ChallengeFailed { .. } => "challenge_failed",
            LoginTransactionInvalidated { .. } => "login_transaction_invalidated",
            MfaEnrolled { .. } => "mfa_enrolled",
            BackupCodesGenerated { .. } => "backup_codes_generated",
            BackupCodeConsumed { .. } => "backup_code_consumed",
            DeviceVerified { .. } => "device_verified",
            SessionIssued { .. } => "session_issued",
            SessionRevoked { .. } => "session_revoked",
            PermissionDenied { .. } => "permission_denied",
        }
    }

    /// Default severity for the event type
    pub const fn default_level(&self) -> AuditLevel {
        use AuditEvent::*;
        match self {
            LoginSucceeded { .. }
            | MfaEnrolled { .. }
            | BackupCodesGenerated { .. }
            | DeviceVerified { .. }
            | SessionIssued { .. }
            | SessionRevoked { .. } => AuditLevel::Info,
            LoginFailed { .. } | ChallengeFailed { .. } | BackupCodeConsumed { .. } => {
                AuditLevel::Warning
            }
            LoginTransactionInvalidated { .. } | PermissionDenied { .. } => AuditLevel::Security,
        }
    }
}

/// Who did it, from where, under which request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub client_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub trace_id: Option<String>,
    pub correlation_id: Option<String>,
}

impl ActorContext {
    /// Fill unset fields from the request context. Explicitly provided
    /// values always win over ambient enrichment.
    pub fn enrich_from(&mut self, ctx: &RequestContext) {
        if self.user_id.is_none() {
            self.user_id = ctx.user_id.map(|id| id.into_uuid());
        }
        if self.session_id.is_none() {
            self.session_id = ctx.session_id.map(|id| id.into_uuid());
        }
        if self.client_ip.is_none() {
            self.client_ip = ctx.client_ip;
        }
        if self.user_agent.is_none() {
            self.user_agent = ctx.user_agent.clone();
        }
        if self.request_id.is_none() {
            self.request_id = ctx.request_id.clone();
        }
        if self.trace_id.is_none() {
            self.trace_id = ctx.trace_id.clone();
        }
        if self.correlation_id.is_none() {
            self.correlation_id = ctx.correlation_id.clone();
        }
    }
}

/// One enqueued (and eventually persisted) audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub log_id: LogId,
    pub level: AuditLevel,
    pub event: AuditEvent,
    pub actor: ActorContext,
    pub occurred_at: DateTime<Utc>,
}

/// Query filter for the privileged audit surface
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub level: Option<AuditLevel>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::id::{SessionId, UserId};

    #[test]
    fn test_event_type_stability() {
        let event = AuditEvent::LoginSucceeded {
            user_id: Uuid::new_v4(),
            method: "totp".to_string(),
        };
        assert_eq!(event.event_type(), "login_succeeded");

        let event = AuditEvent::SessionRevoked {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            by_admin: true,
        };
        assert_eq!(event.event_type(), "session_revoked");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = AuditEvent::BackupCodeConsumed {
            user_id: Uuid::nil(),
            remaining: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "backup_code_consumed");
        assert_eq!(json["remaining"], 7);
    }

    #[test]
    fn test_default_levels() {
        let denied = AuditEvent::PermissionDenied {
            user_id: Uuid::nil(),
            detail: "audit:read".to_string(),
        };
        assert_eq!(denied.default_level(), AuditLevel::Security);

        let issued = AuditEvent::SessionIssued {
            user_id: Uuid::nil(),
            session_id: Uuid::nil(),
        };
        assert_eq!(issued.default_level(), AuditLevel::Info);
    }

    #[test]
    fn test_enrich_fills_gaps_only() {
        let user_id = UserId::new();
        let session_id = SessionId::new();
        let ctx = RequestContext::new()
            .with_user(user_id)
            .with_session(session_id)
            .with_trace_id("trace-9")
            .with_client("10.1.1.1".parse().ok(), Some("ua".to_string()));

        let explicit_user = Uuid::new_v4();
        let mut actor = ActorContext {
            user_id: Some(explicit_user),
            ..Default::default()
        };
        actor.enrich_from(&ctx);

        // Explicit value preserved, gaps filled
        assert_eq!(actor.user_id, Some(explicit_user));
        assert_eq!(actor.session_id, Some(session_id.into_uuid()));
        assert_eq!(actor.trace_id.as_deref(), Some("trace-9"));
        assert_eq!(actor.client_ip, "10.1.1.1".parse().ok());
        assert!(actor.request_id.is_some());
    }
}
