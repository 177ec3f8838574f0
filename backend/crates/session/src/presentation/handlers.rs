//! HTTP Handlers

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use std::sync::Arc;

use audit::AuditPipeline;
use kernel::context::RequestContext;
use kernel::id::{SessionId, UserId};
use kernel::principal::CurrentUser;
use platform::client::extract_client_ip;

use crate::application::config::SessionConfig;
use crate::application::{ListSessionsUseCase, RevokeSessionsUseCase};
use crate::domain::repository::{SessionFilter, SessionRepository};
use crate::error::SessionResult;
use crate::presentation::dto::{
    RevokeSessionsRequest, RevokeSessionsResponse, SessionDoc, SessionListQuery,
    SessionListResponse,
};

/// Shared state for session handlers
#[derive(Clone)]
pub struct SessionAppState<S>
where
    S: SessionRepository + Clone + Send + Sync + 'static,
{
    pub repo: Arc<S>,
    pub pipeline: AuditPipeline,
    pub config: Arc<SessionConfig>,
}

/// GET /sessions
pub async fn list_sessions<S>(
    State(state): State<SessionAppState<S>>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<SessionListQuery>,
) -> SessionResult<Json<SessionListResponse>>
where
    S: SessionRepository + Clone + Send + Sync + 'static,
{
    let use_case = ListSessionsUseCase::new(state.repo.clone());

    let filter = SessionFilter {
        user_id: query.user_id.map(UserId::from_uuid),
        active_only: query.active_only,
    };

    let page = use_case
        .execute(&current_user, filter, query.cursor, query.take)
        .await?;

    Ok(Json(SessionListResponse {
        docs: page
            .docs
            .iter()
            .map(|session| SessionDoc::from_session(session, &current_user))
            .collect(),
        has_next: page.has_next,
        next_cursor: page.next_cursor,
    }))
}

/// POST /sessions/revoke
pub async fn revoke_sessions<S>(
    State(state): State<SessionAppState<S>>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<RevokeSessionsRequest>,
) -> SessionResult<Json<RevokeSessionsResponse>>
where
    S: SessionRepository + Clone + Send + Sync + 'static,
{
    let ctx = request_context(&headers, &current_user);

    let use_case = RevokeSessionsUseCase::new(state.repo.clone(), state.pipeline.clone());
    let ids = req
        .ids
        .map(|ids| ids.into_iter().map(SessionId::from_uuid).collect());

    let revoked = use_case.execute(&current_user, ids, &ctx).await?;

    Ok(Json(RevokeSessionsResponse { revoked }))
}

/// Build the explicit request context for audit enrichment
fn request_context(headers: &HeaderMap, current_user: &CurrentUser) -> RequestContext {
    let client_ip = extract_client_ip(headers, None);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut ctx = RequestContext::new()
        .with_user(current_user.user_id)
        .with_session(current_user.session_id)
        .with_client(client_ip, user_agent);

    if let Some(request_id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_request_id(request_id);
    }
    if let Some(trace_id) = headers.get("x-trace-id").and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_trace_id(trace_id);
    }

    ctx
}
