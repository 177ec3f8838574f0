//! PostgreSQL Repository Implementation

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::Session;
use crate::domain::repository::{SessionCursor, SessionFilter, SessionRepository};
use crate::error::{SessionError, SessionResult};
use kernel::id::{SessionId, UserId};
use kernel::principal::UserRole;

/// PostgreSQL-backed session repository
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &Session) -> SessionResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id,
                user_id,
                user_role,
                refresh_token_hash,
                expires_at_ms,
                revoked,
                client_fingerprint_hash,
                client_ip,
                user_agent,
                created_at,
                last_activity_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.session_id.as_uuid())
        .bind(session.user_id.as_uuid())
        .bind(session.user_role.id())
        .bind(&session.refresh_token_hash)
        .bind(session.expires_at_ms)
        .bind(session.revoked)
        .bind(&session.client_fingerprint_hash)
        .bind(&session.client_ip)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.last_activity_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, session_id: SessionId) -> SessionResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id,
                user_id,
                user_role,
                refresh_token_hash,
                expires_at_ms,
                revoked,
                client_fingerprint_hash,
                client_ip,
                user_agent,
                created_at,
                last_activity_at
            FROM sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_session()).transpose()
    }

    async fn find_active_by_user(&self, user_id: &UserId) -> SessionResult<Vec<Session>> {
        let now_ms = Utc::now().timestamp_millis();

        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id,
                user_id,
                user_role,
                refresh_token_hash,
                expires_at_ms,
                revoked,
                client_fingerprint_hash,
                client_ip,
                user_agent,
                created_at,
                last_activity_at
            FROM sessions
            WHERE user_id = $1 AND revoked = FALSE AND expires_at_ms > $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_session()).collect()
    }

    async fn touch(&self, session_id: SessionId, at: DateTime<Utc>) -> SessionResult<()> {
        sqlx::query("UPDATE sessions SET last_activity_at = $2 WHERE session_id = $1")
            .bind(session_id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_for_user(
        &self,
        user_id: &UserId,
        ids: Option<&[SessionId]>,
    ) -> SessionResult<Vec<SessionId>> {
        let now_ms = Utc::now().timestamp_millis();
        let id_array: Option<Vec<Uuid>> =
            ids.map(|ids| ids.iter().map(|id| id.into_uuid()).collect());

        // Only live rows flip; already-revoked rows make this idempotent
        let revoked = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE sessions
            SET revoked = TRUE
            WHERE user_id = $1
              AND revoked = FALSE
              AND expires_at_ms > $2
              AND ($3::uuid[] IS NULL OR session_id = ANY($3))
            RETURNING session_id
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(now_ms)
        .bind(id_array)
        .fetch_all(&self.pool)
        .await?;

        Ok(revoked.into_iter().map(SessionId::from_uuid).collect())
    }

    async fn revoke_many(&self, ids: &[SessionId]) -> SessionResult<Vec<(UserId, SessionId)>> {
        let id_array: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();

        let revoked = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            UPDATE sessions
            SET revoked = TRUE
            WHERE session_id = ANY($1) AND revoked = FALSE
            RETURNING user_id, session_id
            "#,
        )
        .bind(id_array)
        .fetch_all(&self.pool)
        .await?;

        Ok(revoked
            .into_iter()
            .map(|(user, session)| (UserId::from_uuid(user), SessionId::from_uuid(session)))
            .collect())
    }

    async fn list_page(
        &self,
        filter: &SessionFilter,
        cursor: Option<SessionCursor>,
        take: i64,
    ) -> SessionResult<Vec<Session>> {
        let now_ms = Utc::now().timestamp_millis();
        let cursor_at = cursor.and_then(|c| DateTime::from_timestamp_micros(c.created_at_micros));
        let cursor_id = cursor.map(|c| c.session_id.into_uuid());

        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id,
                user_id,
                user_role,
                refresh_token_hash,
                expires_at_ms,
                revoked,
                client_fingerprint_hash,
                client_ip,
                user_agent,
                created_at,
                last_activity_at
            FROM sessions
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND (NOT $2 OR (revoked = FALSE AND expires_at_ms > $3))
              AND ($4::timestamptz IS NULL OR (created_at, session_id) < ($4, $5))
            ORDER BY created_at DESC, session_id DESC
            LIMIT $6
            "#,
        )
        .bind(filter.user_id.map(|id| id.into_uuid()))
        .bind(filter.active_only)
        .bind(now_ms)
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(take)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_session()).collect()
    }

    async fn cleanup_expired(&self) -> SessionResult<u64> {
        let now_ms = Utc::now().timestamp_millis();

        let deleted = sqlx::query("DELETE FROM sessions WHERE expires_at_ms < $1")
            .bind(now_ms)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(sessions_deleted = deleted, "Cleaned up expired sessions");
        Ok(deleted)
    }
}

// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Uuid,
    user_role: i16,
    refresh_token_hash: Vec<u8>,
    expires_at_ms: i64,
    revoked: bool,
    client_fingerprint_hash: Vec<u8>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> SessionResult<Session> {
        let user_role = UserRole::from_id(self.user_role)
            .ok_or_else(|| SessionError::Internal(format!("Unknown role id: {}", self.user_role)))?;

        Ok(Session {
            session_id: SessionId::from_uuid(self.session_id),
            user_id: UserId::from_uuid(self.user_id),
            user_role,
            refresh_token_hash: self.refresh_token_hash,
            expires_at_ms: self.expires_at_ms,
            revoked: self.revoked,
            client_fingerprint_hash: self.client_fingerprint_hash,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        })
    }
}
