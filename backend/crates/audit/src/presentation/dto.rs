//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entry::AuditLogEntry;

/// Audit log query parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub user_id: Option<Uuid>,
    /// info | warning | security
    pub level: Option<String>,
    pub event_type: Option<String>,
    /// Inclusive lower bound (Unix ms)
    pub from_ms: Option<i64>,
    /// Inclusive upper bound (Unix ms)
    pub to_ms: Option<i64>,
    pub take: Option<i64>,
}

/// One audit log document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogDoc {
    /// Snowflake id as a string (exceeds JS safe-integer range)
    pub log_id: String,
    pub level: String,
    pub event_type: String,
    pub event: serde_json::Value,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub trace_id: Option<String>,
    pub correlation_id: Option<String>,
    pub occurred_at_ms: i64,
}

impl From<AuditLogEntry> for AuditLogDoc {
    fn from(entry: AuditLogEntry) -> Self {
        let event_type = entry.event.event_type().to_string();
        Self {
            log_id: entry.log_id.to_string(),
            level: entry.level.as_str().to_string(),
            event_type,
            event: serde_json::to_value(&entry.event).unwrap_or_default(),
            user_id: entry.actor.user_id,
            session_id: entry.actor.session_id,
            client_ip: entry.actor.client_ip.map(|ip| ip.to_string()),
            user_agent: entry.actor.user_agent,
            request_id: entry.actor.request_id,
            trace_id: entry.actor.trace_id,
            correlation_id: entry.actor.correlation_id,
            occurred_at_ms: entry.occurred_at.timestamp_millis(),
        }
    }
}

/// Audit log query response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogListResponse {
    pub docs: Vec<AuditLogDoc>,
    /// Total matches for the filter, independent of `take`
    pub count: i64,
}
