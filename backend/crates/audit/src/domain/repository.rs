//! Repository Traits
//!
//! Interfaces for audit log persistence. Implementation is in the
//! infrastructure layer.

use crate::domain::entry::{AuditLogEntry, AuditLogFilter};
use crate::error::AuditResult;

/// Audit log repository trait
#[trait_variant::make(AuditLogRepository: Send)]
pub trait LocalAuditLogRepository {
    /// Persist one entry
    async fn insert(&self, entry: &AuditLogEntry) -> AuditResult<()>;

    /// Query entries, newest first, with a total count for the filter
    async fn query(
        &self,
        filter: &AuditLogFilter,
        limit: i64,
    ) -> AuditResult<(Vec<AuditLogEntry>, i64)>;
}
