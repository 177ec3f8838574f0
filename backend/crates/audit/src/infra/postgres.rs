//! PostgreSQL Repository Implementation

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entry::{ActorContext, AuditLevel, AuditLogEntry, AuditLogFilter};
use crate::domain::repository::AuditLogRepository;
use crate::error::{AuditError, AuditResult};
use kernel::id::LogId;

/// PostgreSQL-backed audit log repository
#[derive(Clone)]
pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete entries older than the retention horizon
    pub async fn cleanup_before(&self, horizon: DateTime<Utc>) -> AuditResult<u64> {
        let deleted = sqlx::query("DELETE FROM audit_logs WHERE occurred_at < $1")
            .bind(horizon)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(entries_deleted = deleted, "Cleaned up old audit logs");
        Ok(deleted)
    }
}

impl AuditLogRepository for PgAuditLogRepository {
    async fn insert(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        let event = serde_json::to_value(&entry.event)
            .map_err(|e| AuditError::Internal(format!("Event not serializable: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                log_id,
                level,
                event_type,
                event,
                user_id,
                session_id,
                client_ip,
                user_agent,
                request_id,
                trace_id,
                correlation_id,
                occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.log_id.as_i64())
        .bind(entry.level.as_str())
        .bind(entry.event.event_type())
        .bind(event)
        .bind(entry.actor.user_id)
        .bind(entry.actor.session_id)
        .bind(entry.actor.client_ip.map(|ip| ip.to_string()))
        .bind(&entry.actor.user_agent)
        .bind(&entry.actor.request_id)
        .bind(&entry.actor.trace_id)
        .bind(&entry.actor.correlation_id)
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        filter: &AuditLogFilter,
        limit: i64,
    ) -> AuditResult<(Vec<AuditLogEntry>, i64)> {
        let level = filter.level.map(|l| l.as_str());

        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT
                log_id,
                level,
                event,
                user_id,
                session_id,
                client_ip,
                user_agent,
                request_id,
                trace_id,
                correlation_id,
                occurred_at
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR level = $2)
              AND ($3::text IS NULL OR event_type = $3)
              AND ($4::timestamptz IS NULL OR occurred_at >= $4)
              AND ($5::timestamptz IS NULL OR occurred_at <= $5)
            ORDER BY log_id DESC
            LIMIT $6
            "#,
        )
        .bind(filter.user_id)
        .bind(level)
        .bind(&filter.event_type)
        .bind(filter.from)
        .bind(filter.to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR level = $2)
              AND ($3::text IS NULL OR event_type = $3)
              AND ($4::timestamptz IS NULL OR occurred_at >= $4)
              AND ($5::timestamptz IS NULL OR occurred_at <= $5)
            "#,
        )
        .bind(filter.user_id)
        .bind(level)
        .bind(&filter.event_type)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(|r| r.into_entry())
            .collect::<AuditResult<Vec<_>>>()?;

        Ok((entries, count))
    }
}

// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct AuditLogRow {
    log_id: i64,
    level: String,
    event: serde_json::Value,
    user_id: Option<Uuid>,
    session_id: Option<Uuid>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    request_id: Option<String>,
    trace_id: Option<String>,
    correlation_id: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl AuditLogRow {
    fn into_entry(self) -> AuditResult<AuditLogEntry> {
        let level = AuditLevel::from_str(&self.level)
            .ok_or_else(|| AuditError::Internal(format!("Unknown audit level: {}", self.level)))?;
        let event = serde_json::from_value(self.event)
            .map_err(|e| AuditError::Internal(format!("Stored event not decodable: {e}")))?;

        Ok(AuditLogEntry {
            log_id: LogId(self.log_id),
            level,
            event,
            actor: ActorContext {
                user_id: self.user_id,
                session_id: self.session_id,
                client_ip: self.client_ip.and_then(|s| s.parse().ok()),
                user_agent: self.user_agent,
                request_id: self.request_id,
                trace_id: self.trace_id,
                correlation_id: self.correlation_id,
            },
            occurred_at: self.occurred_at,
        })
    }
}
