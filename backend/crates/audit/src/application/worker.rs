//! Audit Worker (consumer side)
//!
//! Drains the pipeline queue and persists entries one at a time. Each entry
//! is retried independently with exponential backoff; after the final
//! attempt fails the entry is dead-lettered: logged with full detail and
//! counted in the worker metrics. Nothing here ever propagates back to the
//! request that produced the entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::entry::AuditLogEntry;
use crate::domain::repository::AuditLogRepository;

/// Retry behavior for failed persistence
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per entry (first try included)
    pub max_attempts: u32,
    /// Backoff before attempt n+1 is `base_backoff * 2^(n-1)`
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    fn backoff_after(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Failure observability for the worker; the only place dead letters show up
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    persisted: AtomicU64,
    retries: AtomicU64,
    dead_lettered: AtomicU64,
}

impl WorkerMetrics {
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }
}

/// Queue consumer persisting audit entries
pub struct AuditWorker<R>
where
    R: AuditLogRepository,
{
    repo: Arc<R>,
    policy: RetryPolicy,
    metrics: Arc<WorkerMetrics>,
}

impl<R> AuditWorker<R>
where
    R: AuditLogRepository,
{
    pub fn new(repo: Arc<R>, policy: RetryPolicy) -> Self {
        Self {
            repo,
            policy,
            metrics: Arc::new(WorkerMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }

    /// Run until the producer side closes the queue
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<AuditLogEntry>) {
        tracing::info!("Audit worker started");
        while let Some(entry) = receiver.recv().await {
            self.persist_with_retry(entry).await;
        }
        tracing::info!("Audit queue closed; worker stopping");
    }

    async fn persist_with_retry(&self, entry: AuditLogEntry) {
        for attempt in 1..=self.policy.max_attempts {
            match self.repo.insert(&entry).await {
                Ok(()) => {
                    self.metrics.persisted.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                    let backoff = self.policy.backoff_after(attempt);
                    tracing::warn!(
                        log_id = %entry.log_id,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Audit persistence failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    self.metrics.dead_lettered.fetch_add(1, Ordering::Relaxed);
                    // Last line of visibility for this entry: log everything
                    tracing::error!(
                        log_id = %entry.log_id,
                        event_type = entry.event.event_type(),
                        entry = %serde_json::to_string(&entry).unwrap_or_default(),
                        error = %e,
                        "Audit entry dead-lettered after {} attempts",
                        self.policy.max_attempts
                    );
                }
            }
        }
    }
}
