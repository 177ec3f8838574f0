//! HTTP Handlers

use axum::Json;
use axum::extract::{Extension, Query, State};
use std::sync::Arc;

use chrono::DateTime;
use kernel::error::app_error::AppResult;
use kernel::policy::{PolicyCtx, PolicyEngine, PolicyRef};
use kernel::principal::CurrentUser;

use crate::domain::entry::{AuditLevel, AuditLogFilter};
use crate::domain::repository::AuditLogRepository;
use crate::presentation::dto::{AuditLogDoc, AuditLogListResponse, AuditLogQuery};

const DEFAULT_TAKE: i64 = 50;
const MAX_TAKE: i64 = 200;

/// Shared state for audit handlers
pub struct AuditAppState<R>
where
    R: AuditLogRepository + Send + Sync + 'static,
{
    pub repo: Arc<R>,
    pub engine: PolicyEngine,
    pub read_policy: PolicyRef,
}

impl<R> Clone for AuditAppState<R>
where
    R: AuditLogRepository + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            engine: self.engine.clone(),
            read_policy: self.read_policy.clone(),
        }
    }
}

/// GET /audit-logs (mounted under /admin)
pub async fn query_audit_logs<R>(
    State(state): State<AuditAppState<R>>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Json<AuditLogListResponse>>
where
    R: AuditLogRepository + Send + Sync + 'static,
{
    let mut ctx = PolicyCtx::new(current_user);
    state
        .engine
        .authorize(&state.read_policy, &mut ctx, None)
        .await?;

    let filter = AuditLogFilter {
        user_id: query.user_id,
        level: query.level.as_deref().and_then(AuditLevel::from_str),
        event_type: query.event_type,
        from: query.from_ms.and_then(DateTime::from_timestamp_millis),
        to: query.to_ms.and_then(DateTime::from_timestamp_millis),
    };
    let take = query.take.unwrap_or(DEFAULT_TAKE).clamp(1, MAX_TAKE);

    let (entries, count) = state.repo.query(&filter, take).await.map_err(|e| {
        tracing::error!(error = %e, "Audit log query failed");
        e.to_app_error()
    })?;

    Ok(Json(AuditLogListResponse {
        docs: entries.into_iter().map(AuditLogDoc::from).collect(),
        count,
    }))
}
