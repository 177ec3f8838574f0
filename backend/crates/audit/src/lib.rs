//! Audit Log Pipeline
//!
//! Durable, asynchronous, at-least-once compliance logging.
//!
//! The request path only ever *enqueues*: [`application::pipeline::
//! AuditPipeline::push`] enriches the entry from the request context,
//! assigns a globally ordered id and returns immediately. A separate
//! [`application::worker::AuditWorker`] drains the queue and persists each
//! entry with bounded retries; entries that exhaust their retries are
//! counted as dead-lettered and become visible through worker metrics, never
//! through API errors.

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::pipeline::AuditPipeline;
pub use application::worker::{AuditWorker, RetryPolicy, WorkerMetrics};
pub use domain::entry::{ActorContext, AuditEvent, AuditLevel, AuditLogEntry};
pub use error::{AuditError, AuditResult};
pub use infra::postgres::PgAuditLogRepository;
pub use presentation::router::audit_router;
