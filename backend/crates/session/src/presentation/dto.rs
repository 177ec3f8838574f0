//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kernel::principal::CurrentUser;

use crate::domain::entity::Session;

// ============================================================================
// List Sessions
// ============================================================================

/// Session list query parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListQuery {
    pub cursor: Option<String>,
    pub take: Option<i64>,
    #[serde(default)]
    pub active_only: bool,
    /// Honored only for privileged callers; everyone else is scoped to self
    pub user_id: Option<Uuid>,
}

/// One session document (non-sensitive fields only)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDoc {
    pub session_id: Uuid,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at_ms: i64,
    pub last_activity_at_ms: i64,
    pub expires_at_ms: i64,
    pub revoked: bool,
    /// True for the session the caller used to make this request
    pub is_current: bool,
}

impl SessionDoc {
    pub fn from_session(session: &Session, current_user: &CurrentUser) -> Self {
        Self {
            session_id: session.session_id.into_uuid(),
            client_ip: session.client_ip.clone(),
            user_agent: session.user_agent.clone(),
            created_at_ms: session.created_at.timestamp_millis(),
            last_activity_at_ms: session.last_activity_at.timestamp_millis(),
            expires_at_ms: session.expires_at_ms,
            revoked: session.revoked,
            is_current: session.session_id == current_user.session_id,
        }
    }
}

/// Session list response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub docs: Vec<SessionDoc>,
    pub has_next: bool,
    pub next_cursor: Option<String>,
}

// ============================================================================
// Revoke Sessions
// ============================================================================

/// Revoke request. Omitting `ids` revokes all of the caller's sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionsRequest {
    pub ids: Option<Vec<Uuid>>,
}

/// Revoke response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionsResponse {
    pub revoked: usize,
}
