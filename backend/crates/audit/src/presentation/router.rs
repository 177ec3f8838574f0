//! Audit Router

use axum::{Router, routing::get};
use std::sync::Arc;

use kernel::context::RequestContext;
use kernel::id::UserId;
use kernel::policy::{self, PolicyEngine};
use kernel::principal::UserRole;

use crate::application::pipeline::AuditPipeline;
use crate::domain::entry::AuditEvent;
use crate::domain::repository::AuditLogRepository;
use crate::presentation::handlers::{self, AuditAppState};

/// Create the privileged audit router.
///
/// The caller mounts this under `/admin` behind the session middleware.
/// Denied queries are themselves audited through the deny hook.
pub fn audit_router<R>(repo: Arc<R>, pipeline: AuditPipeline) -> Router
where
    R: AuditLogRepository + Send + Sync + 'static,
{
    let deny_pipeline = pipeline.clone();
    let engine = PolicyEngine::new().with_on_deny(move |ctx| {
        let user_id: UserId = ctx.current_user.user_id;
        deny_pipeline.push(
            AuditEvent::PermissionDenied {
                user_id: user_id.into_uuid(),
                detail: "audit-log query".to_string(),
            },
            &RequestContext::new().with_user(user_id),
        );
    });

    let state = AuditAppState {
        repo,
        engine,
        read_policy: policy::any_of(vec![
            policy::is_role(UserRole::Admin),
            policy::has("audit:read"),
        ]),
    };

    Router::new()
        .route("/audit-logs", get(handlers::query_audit_logs::<R>))
        .with_state(state)
}
