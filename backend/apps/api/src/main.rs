//! API Server Entry Point
//!
//! Application entry point and server initialization. Uses `anyhow` for
//! startup errors; request-path errors go through the per-crate error types
//! and the unified `kernel::error::AppError` envelope.
//!
//! Dependency wiring happens once here: one Postgres pool, one Redis
//! connection manager, one audit pipeline with its worker task, and every
//! service receives its collaborators through constructors.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, http,
    http::{Method, header},
    middleware,
};
use base64::Engine;
use base64::engine::general_purpose;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit::{AuditPipeline, AuditWorker, PgAuditLogRepository, RetryPolicy, audit_router};
use auth::application::config::AuthConfig;
use auth::domain::notifier::TracingNotifier;
use auth::infra::faststore::{FastStoreAuthTxStore, FastStoreEnrollmentStore};
use auth::presentation::handlers::AuthAppState;
use auth::presentation::router::{auth_mfa_router, auth_router};
use auth::PgAuthRepository;
use kernel::id::LogIdGenerator;
use platform::lock::{IdempotencyGuard, LockManager};
use platform::rate_limit::RateLimiter;
use platform::redis_store::RedisFastStore;
use session::domain::repository::SessionRepository;
use session::presentation::middleware::{SessionMiddlewareState, require_session};
use session::{PgSessionRepository, SessionConfig, session_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,auth=info,session=info,audit=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    // Fast ephemeral store (login transactions, locks, rate limits)
    let redis_url =
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let fast_store = Arc::new(
        RedisFastStore::connect(&redis_url)
            .await
            .map_err(|e| anyhow::anyhow!("Redis connection failed: {e}"))?,
    );

    tracing::info!("Connected to fast store");

    // Startup cleanup: best effort, never blocks boot
    let session_repo_for_cleanup = PgSessionRepository::new(pool.clone());
    match session_repo_for_cleanup.cleanup_expired().await {
        Ok(deleted) => {
            tracing::info!(sessions_deleted = deleted, "Session cleanup completed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Session cleanup failed, continuing anyway");
        }
    }

    let audit_repo_for_cleanup = PgAuditLogRepository::new(pool.clone());
    let retention_horizon = chrono::Utc::now() - chrono::Duration::days(365);
    match audit_repo_for_cleanup.cleanup_before(retention_horizon).await {
        Ok(deleted) => {
            tracing::info!(entries_deleted = deleted, "Audit log cleanup completed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Audit log cleanup failed, continuing anyway");
        }
    }

    // Audit pipeline + worker
    let worker_id: u16 = env::var("AUDIT_WORKER_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let (pipeline, audit_queue) = AuditPipeline::new(Arc::new(LogIdGenerator::new(worker_id)));

    let audit_repo = Arc::new(PgAuditLogRepository::new(pool.clone()));
    let worker = AuditWorker::new(audit_repo.clone(), RetryPolicy::default());
    let worker_metrics = worker.metrics();
    tokio::spawn(worker.run(audit_queue));

    // Worker-side failure visibility: dead letters only ever show up here
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            tracing::debug!(
                persisted = worker_metrics.persisted(),
                retries = worker_metrics.retries(),
                dead_lettered = worker_metrics.dead_lettered(),
                "Audit worker metrics"
            );
        }
    });

    // Configuration
    let auth_config = if cfg!(debug_assertions) {
        AuthConfig::development()
    } else {
        let pepper_b64 =
            env::var("AUTH_PEPPER").expect("AUTH_PEPPER must be set in production");
        AuthConfig {
            password_pepper: Some(Engine::decode(&general_purpose::STANDARD, &pepper_b64)?),
            ..AuthConfig::default()
        }
    };

    let session_config = if cfg!(debug_assertions) {
        SessionConfig::development()
    } else {
        let secret_b64 = env::var("SESSION_TOKEN_SECRET")
            .expect("SESSION_TOKEN_SECRET must be set in production");
        let secret_bytes = Engine::decode(&general_purpose::STANDARD, &secret_b64)?;
        let mut token_secret = [0u8; 32];
        token_secret.copy_from_slice(&secret_bytes);
        SessionConfig {
            token_secret,
            ..SessionConfig::default()
        }
    };
    let session_config = Arc::new(SessionConfig {
        single_session: env::var("SINGLE_SESSION")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(session_config.single_session),
        ..session_config
    });

    // Repositories and stores
    let auth_repo = Arc::new(PgAuthRepository::new(pool.clone()));
    let session_repo = Arc::new(PgSessionRepository::new(pool.clone()));

    let auth_state = AuthAppState {
        repo: auth_repo,
        tx_store: Arc::new(FastStoreAuthTxStore::new(fast_store.clone())),
        enrollments: Arc::new(FastStoreEnrollmentStore::new(fast_store.clone())),
        session_repo: session_repo.clone(),
        locks: Arc::new(LockManager::new(fast_store.clone())),
        limiter: Arc::new(RateLimiter::new(fast_store.clone())),
        idempotency: Arc::new(IdempotencyGuard::new(fast_store.clone())),
        notifier: Arc::new(TracingNotifier),
        pipeline: pipeline.clone(),
        config: Arc::new(auth_config),
        session_config: session_config.clone(),
    };

    let session_mw_state = SessionMiddlewareState {
        repo: session_repo.clone(),
        config: session_config.clone(),
    };
    let require_session_layer = middleware::from_fn_with_state(
        session_mw_state,
        require_session::<PgSessionRepository>,
    );

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    // Build router: the login flow is anonymous; MFA management, session
    // management and the audit surface require a resolved session.
    let auth_routes = auth_router(auth_state.clone())
        .merge(auth_mfa_router(auth_state).layer(require_session_layer.clone()));

    let app = Router::new()
        .nest("/auth", auth_routes)
        .nest(
            "/sessions",
            session_router(session_repo, pipeline.clone(), session_config)
                .layer(require_session_layer.clone()),
        )
        .nest(
            "/admin",
            audit_router(audit_repo, pipeline).layer(require_session_layer),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
