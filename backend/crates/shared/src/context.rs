//! Request Context
//!
//! Explicit request-scoped context threaded through every call that needs
//! actor information (audit logging, risk evaluation). There is no ambient
//! task-local state: handlers build one of these and pass it down.

use std::net::IpAddr;
use uuid::Uuid;

use crate::id::{SessionId, UserId};

/// Request-scoped actor context
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Server-assigned request id (generated if the client sent none)
    pub request_id: Option<String>,
    /// Distributed trace id, when the edge propagated one
    pub trace_id: Option<String>,
    /// Business correlation id, when the edge propagated one
    pub correlation_id: Option<String>,
    /// Authenticated user, when known
    pub user_id: Option<UserId>,
    /// Session the request runs under, when known
    pub session_id: Option<SessionId>,
    /// Client IP (X-Forwarded-For aware)
    pub client_ip: Option<IpAddr>,
    /// Client User-Agent
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Fresh context with a generated request id
    pub fn new() -> Self {
        Self {
            request_id: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_client(mut self, ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        self.client_ip = ip;
        self.user_agent = user_agent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_assigns_request_id() {
        let ctx = RequestContext::new();
        assert!(ctx.request_id.is_some());
        assert!(ctx.user_id.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let user_id = UserId::new();
        let ctx = RequestContext::new()
            .with_trace_id("trace-1")
            .with_user(user_id)
            .with_client("10.0.0.1".parse().ok(), Some("agent".to_string()));

        assert_eq!(ctx.trace_id.as_deref(), Some("trace-1"));
        assert_eq!(ctx.user_id, Some(user_id));
        assert_eq!(ctx.client_ip, "10.0.0.1".parse().ok());
        assert_eq!(ctx.user_agent.as_deref(), Some("agent"));
    }
}
