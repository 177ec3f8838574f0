//! Session Middleware
//!
//! Bearer-token authentication for protected routes. On success the
//! resolved [`CurrentUser`] is stored in request extensions for handlers
//! and the policy engine.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use platform::client::{extract_client_ip, extract_fingerprint};

use crate::application::config::SessionConfig;
use crate::application::resolve::ResolveSessionUseCase;
use crate::domain::repository::SessionRepository;
use crate::error::SessionError;

/// Middleware state
#[derive(Clone)]
pub struct SessionMiddlewareState<S>
where
    S: SessionRepository + Clone + Send + Sync + 'static,
{
    pub repo: Arc<S>,
    pub config: Arc<SessionConfig>,
}

/// Middleware that requires a valid bearer session
pub async fn require_session<S>(
    State(state): State<SessionMiddlewareState<S>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response>
where
    S: SessionRepository + Clone + Send + Sync + 'static,
{
    let headers = req.headers();

    let client_ip = req
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip());
    let client_ip = extract_client_ip(headers, client_ip);

    let fingerprint = match extract_fingerprint(headers, client_ip) {
        Ok(fp) => fp,
        Err(e) => return Err(SessionError::from(e).into_response()),
    };

    let token = match extract_bearer_token(headers) {
        Some(token) => token,
        None => return Err(SessionError::SessionInvalid.into_response()),
    };

    let use_case = ResolveSessionUseCase::new(state.repo.clone(), state.config.clone());
    let current_user = match use_case.execute(&token, &fingerprint.device_hash).await {
        Ok(user) => user,
        Err(e) => return Err(e.into_response()),
    };

    req.extensions_mut().insert(current_user);

    Ok(next.run(req).await)
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
