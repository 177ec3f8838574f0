//! Audit Pipeline (producer side)
//!
//! `push` runs on the request path and must stay cheap and infallible:
//! enrich, assign an id, enqueue, return. Persistence problems belong to the
//! worker; a full or closed queue is logged and swallowed so that audit
//! logging can never abort the operation being audited.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use kernel::context::RequestContext;
use kernel::id::{LogId, LogIdGenerator};

use crate::domain::entry::{ActorContext, AuditEvent, AuditLevel, AuditLogEntry};

/// Producer handle; cheap to clone and share across services
#[derive(Clone)]
pub struct AuditPipeline {
    sender: mpsc::UnboundedSender<AuditLogEntry>,
    ids: Arc<LogIdGenerator>,
}

impl AuditPipeline {
    /// Create the pipeline and the receiver end for the worker
    pub fn new(ids: Arc<LogIdGenerator>) -> (Self, mpsc::UnboundedReceiver<AuditLogEntry>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, ids }, receiver)
    }

    /// Enqueue one event with its default severity
    pub fn push(&self, event: AuditEvent, ctx: &RequestContext) -> LogId {
        let level = event.default_level();
        self.push_with_level(event, level, ctx)
    }

    /// Enqueue one event with an explicit severity
    pub fn push_with_level(
        &self,
        event: AuditEvent,
        level: AuditLevel,
        ctx: &RequestContext,
    ) -> LogId {
        let entry = self.build_entry(event, level, ctx);
        let log_id = entry.log_id;
        self.enqueue(entry);
        log_id
    }

    /// Enqueue several events as one submission
    pub fn push_batch(&self, events: Vec<AuditEvent>, ctx: &RequestContext) -> Vec<LogId> {
        let entries: Vec<AuditLogEntry> = events
            .into_iter()
            .map(|event| {
                let level = event.default_level();
                self.build_entry(event, level, ctx)
            })
            .collect();

        let ids = entries.iter().map(|e| e.log_id).collect();
        for entry in entries {
            self.enqueue(entry);
        }
        ids
    }

    fn build_entry(
        &self,
        event: AuditEvent,
        level: AuditLevel,
        ctx: &RequestContext,
    ) -> AuditLogEntry {
        let mut actor = ActorContext::default();
        actor.enrich_from(ctx);

        AuditLogEntry {
            log_id: self.ids.next_id(),
            level,
            event,
            actor,
            occurred_at: Utc::now(),
        }
    }

    fn enqueue(&self, entry: AuditLogEntry) {
        if let Err(err) = self.sender.send(entry) {
            // The worker is gone. Dropping the entry is the contract: the
            // request must not fail for logging reasons.
            tracing::warn!(
                log_id = %err.0.log_id,
                event_type = err.0.event.event_type(),
                "Audit queue closed; entry dropped"
            );
        }
    }
}
