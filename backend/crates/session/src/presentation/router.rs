//! Session Router

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use audit::AuditPipeline;

use crate::application::config::SessionConfig;
use crate::domain::repository::SessionRepository;
use crate::presentation::handlers::{self, SessionAppState};

/// Create the session router.
///
/// The caller mounts this under `/sessions` behind the session middleware.
pub fn session_router<S>(
    repo: Arc<S>,
    pipeline: AuditPipeline,
    config: Arc<SessionConfig>,
) -> Router
where
    S: SessionRepository + Clone + Send + Sync + 'static,
{
    let state = SessionAppState {
        repo,
        pipeline,
        config,
    };

    Router::new()
        .route("/", get(handlers::list_sessions::<S>))
        .route("/revoke", post(handlers::revoke_sessions::<S>))
        .with_state(state)
}
