//! Authorization Policy Engine
//!
//! Composable allow/deny predicates evaluated against the current user and
//! the request material. Every authenticated endpoint is gated by one policy
//! expression built from the primitives below.
//!
//! Denial is uniform: whichever branch failed, the caller sees the single
//! `PERMISSION_DENIED` error. An optional deny hook runs for audit side
//! effects and cannot break the denial path.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::app_error::{AppError, AppResult};
use crate::id::UserId;
use crate::principal::{CurrentUser, UserRole};

/// Evaluation input: the caller plus the request material a predicate may
/// inspect. `resource` is hydrated by a [`ResourceLoader`] when one is given.
#[derive(Debug, Clone)]
pub struct PolicyCtx {
    pub current_user: CurrentUser,
    pub resource: Option<Value>,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

impl PolicyCtx {
    pub fn new(current_user: CurrentUser) -> Self {
        Self {
            current_user,
            resource: None,
            params: HashMap::new(),
            query: HashMap::new(),
            body: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

pub type PolicyFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// An asynchronous allow/deny predicate
pub trait Policy: Send + Sync {
    fn evaluate<'a>(&'a self, ctx: &'a PolicyCtx) -> PolicyFuture<'a>;
}

pub type PolicyRef = Arc<dyn Policy>;

type LoaderFuture<'a> = Pin<Box<dyn Future<Output = AppResult<Option<Value>>> + Send + 'a>>;

/// Hydrates `ctx.resource` from request params before evaluation
pub trait ResourceLoader: Send + Sync {
    fn load<'a>(&'a self, ctx: &'a PolicyCtx) -> LoaderFuture<'a>;
}

// ============================================================================
// Primitives
// ============================================================================

struct HasPermission(String);

impl Policy for HasPermission {
    fn evaluate<'a>(&'a self, ctx: &'a PolicyCtx) -> PolicyFuture<'a> {
        Box::pin(async move { ctx.current_user.has_permission(&self.0) })
    }
}

/// Allow when the caller's role grants `permission`
pub fn has(permission: impl Into<String>) -> PolicyRef {
    Arc::new(HasPermission(permission.into()))
}

struct IsRole(UserRole);

impl Policy for IsRole {
    fn evaluate<'a>(&'a self, ctx: &'a PolicyCtx) -> PolicyFuture<'a> {
        Box::pin(async move { ctx.current_user.role == self.0 })
    }
}

/// Allow when the caller holds exactly `role`
pub fn is_role(role: UserRole) -> PolicyRef {
    Arc::new(IsRole(role))
}

type SelfSelector = dyn Fn(&PolicyCtx) -> Option<UserId> + Send + Sync;

struct IsSelf(Box<SelfSelector>);

impl Policy for IsSelf {
    fn evaluate<'a>(&'a self, ctx: &'a PolicyCtx) -> PolicyFuture<'a> {
        Box::pin(async move {
            match (self.0)(ctx) {
                Some(target) => target == ctx.current_user.user_id,
                None => false,
            }
        })
    }
}

/// Allow when the selector's target user is the caller.
///
/// Selectors that cannot produce a target (missing param, parse failure)
/// deny; they never fall through to "allowed".
pub fn is_self<F>(selector: F) -> PolicyRef
where
    F: Fn(&PolicyCtx) -> Option<UserId> + Send + Sync + 'static,
{
    Arc::new(IsSelf(Box::new(selector)))
}

struct ResourceAttr(Box<dyn Fn(&Value) -> bool + Send + Sync>);

impl Policy for ResourceAttr {
    fn evaluate<'a>(&'a self, ctx: &'a PolicyCtx) -> PolicyFuture<'a> {
        Box::pin(async move {
            match &ctx.resource {
                Some(resource) => (self.0)(resource),
                None => false,
            }
        })
    }
}

/// Allow when the hydrated resource satisfies `predicate`; denies when no
/// resource was loaded
pub fn resource_attr<F>(predicate: F) -> PolicyRef
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Arc::new(ResourceAttr(Box::new(predicate)))
}

// ============================================================================
// Combinators
// ============================================================================

struct AllOf(Vec<PolicyRef>);

impl Policy for AllOf {
    fn evaluate<'a>(&'a self, ctx: &'a PolicyCtx) -> PolicyFuture<'a> {
        Box::pin(async move {
            for policy in &self.0 {
                if !policy.evaluate(ctx).await {
                    return false;
                }
            }
            true
        })
    }
}

/// Conjunction, short-circuiting on the first deny
pub fn all_of(policies: Vec<PolicyRef>) -> PolicyRef {
    Arc::new(AllOf(policies))
}

struct AnyOf(Vec<PolicyRef>);

impl Policy for AnyOf {
    fn evaluate<'a>(&'a self, ctx: &'a PolicyCtx) -> PolicyFuture<'a> {
        Box::pin(async move {
            for policy in &self.0 {
                if policy.evaluate(ctx).await {
                    return true;
                }
            }
            false
        })
    }
}

/// Disjunction, short-circuiting on the first allow
pub fn any_of(policies: Vec<PolicyRef>) -> PolicyRef {
    Arc::new(AnyOf(policies))
}

struct NotOf(PolicyRef);

impl Policy for NotOf {
    fn evaluate<'a>(&'a self, ctx: &'a PolicyCtx) -> PolicyFuture<'a> {
        Box::pin(async move { !self.0.evaluate(ctx).await })
    }
}

/// Negation
pub fn not_of(policy: PolicyRef) -> PolicyRef {
    Arc::new(NotOf(policy))
}

// ============================================================================
// Engine
// ============================================================================

type DenyHook = Arc<dyn Fn(&PolicyCtx) + Send + Sync>;

/// Evaluates policy expressions and enforces the uniform denial contract
#[derive(Clone, Default)]
pub struct PolicyEngine {
    on_deny: Option<DenyHook>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self { on_deny: None }
    }

    /// Register a side-effecting hook invoked on every denial (audit).
    /// A panicking hook is contained; it never turns a denial into a 500.
    pub fn with_on_deny<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PolicyCtx) + Send + Sync + 'static,
    {
        self.on_deny = Some(Arc::new(hook));
        self
    }

    /// Hydrate the resource (when a loader is given), evaluate, and either
    /// pass or raise the single `PERMISSION_DENIED` error.
    pub async fn authorize(
        &self,
        policy: &PolicyRef,
        ctx: &mut PolicyCtx,
        loader: Option<&dyn ResourceLoader>,
    ) -> AppResult<()> {
        if let Some(loader) = loader
            && ctx.resource.is_none()
        {
            ctx.resource = loader.load(ctx).await?;
        }

        if policy.evaluate(ctx).await {
            return Ok(());
        }

        if let Some(hook) = &self.on_deny {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| hook(ctx)));
            if result.is_err() {
                tracing::warn!("authorization deny hook panicked");
            }
        }

        Err(Self::denied())
    }

    /// The one error every denial maps to
    pub fn denied() -> AppError {
        AppError::forbidden("Permission denied").with_code("PERMISSION_DENIED")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SessionId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx_with_role(role: UserRole) -> PolicyCtx {
        PolicyCtx::new(CurrentUser::new(UserId::new(), SessionId::new(), role))
    }

    #[tokio::test]
    async fn test_has_permission() {
        let ctx = ctx_with_role(UserRole::Admin);
        assert!(has("audit:read").evaluate(&ctx).await);

        let ctx = ctx_with_role(UserRole::User);
        assert!(!has("audit:read").evaluate(&ctx).await);
    }

    #[tokio::test]
    async fn test_is_role() {
        let ctx = ctx_with_role(UserRole::Support);
        assert!(is_role(UserRole::Support).evaluate(&ctx).await);
        assert!(!is_role(UserRole::Admin).evaluate(&ctx).await);
    }

    #[tokio::test]
    async fn test_is_self_matches_param() {
        let ctx = ctx_with_role(UserRole::User);
        let me = ctx.current_user.user_id;
        let ctx = ctx.with_param("userId", me.to_string());

        let policy = is_self(|ctx: &PolicyCtx| {
            ctx.params.get("userId").and_then(|s| UserId::parse(s).ok())
        });
        assert!(policy.evaluate(&ctx).await);
    }

    #[tokio::test]
    async fn test_is_self_denies_on_missing_selector() {
        let ctx = ctx_with_role(UserRole::User);
        let policy = is_self(|ctx: &PolicyCtx| {
            ctx.params.get("userId").and_then(|s| UserId::parse(s).ok())
        });
        assert!(!policy.evaluate(&ctx).await);
    }

    #[tokio::test]
    async fn test_resource_attr_denies_without_resource() {
        let ctx = ctx_with_role(UserRole::User);
        let policy = resource_attr(|r| r["archived"] == Value::Bool(false));
        assert!(!policy.evaluate(&ctx).await);
    }

    #[tokio::test]
    async fn test_combinators() {
        let ctx = ctx_with_role(UserRole::Admin);

        let both = all_of(vec![has("audit:read"), is_role(UserRole::Admin)]);
        assert!(both.evaluate(&ctx).await);

        let either = any_of(vec![has("no:such"), is_role(UserRole::Admin)]);
        assert!(either.evaluate(&ctx).await);

        let negated = not_of(is_role(UserRole::User));
        assert!(negated.evaluate(&ctx).await);
    }

    #[tokio::test]
    async fn test_all_of_short_circuits() {
        struct Counting(Arc<AtomicUsize>, bool);
        impl Policy for Counting {
            fn evaluate<'a>(&'a self, _ctx: &'a PolicyCtx) -> PolicyFuture<'a> {
                self.0.fetch_add(1, Ordering::SeqCst);
                let verdict = self.1;
                Box::pin(async move { verdict })
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let policy = all_of(vec![
            Arc::new(Counting(calls.clone(), false)) as PolicyRef,
            Arc::new(Counting(calls.clone(), true)) as PolicyRef,
        ]);

        let ctx = ctx_with_role(UserRole::User);
        assert!(!policy.evaluate(&ctx).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authorize_denies_uniformly_and_runs_hook() {
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let hook_calls_inner = hook_calls.clone();
        let engine = PolicyEngine::new().with_on_deny(move |_ctx| {
            hook_calls_inner.fetch_add(1, Ordering::SeqCst);
        });

        let mut ctx = ctx_with_role(UserRole::User);
        let err = engine
            .authorize(&has("audit:read"), &mut ctx, None)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 403);
        assert_eq!(err.code(), Some("PERMISSION_DENIED"));
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authorize_panicking_hook_still_denies() {
        let engine = PolicyEngine::new().with_on_deny(|_ctx| panic!("hook exploded"));

        let mut ctx = ctx_with_role(UserRole::User);
        let err = engine
            .authorize(&has("audit:read"), &mut ctx, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("PERMISSION_DENIED"));
    }

    #[tokio::test]
    async fn test_authorize_hydrates_resource() {
        struct OwnerLoader(UserId);
        impl ResourceLoader for OwnerLoader {
            fn load<'a>(&'a self, _ctx: &'a PolicyCtx) -> LoaderFuture<'a> {
                let owner = self.0.to_string();
                Box::pin(async move { Ok(Some(serde_json::json!({ "ownerId": owner }))) })
            }
        }

        let mut ctx = ctx_with_role(UserRole::User);
        let me = ctx.current_user.user_id.to_string();
        let loader = OwnerLoader(ctx.current_user.user_id);

        let owns = resource_attr(move |r| r["ownerId"] == Value::String(me.clone()));

        let engine = PolicyEngine::new();
        engine
            .authorize(&owns, &mut ctx, Some(&loader))
            .await
            .unwrap();
        assert!(ctx.resource.is_some());
    }
}
