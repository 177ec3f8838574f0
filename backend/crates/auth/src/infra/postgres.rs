//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::{credential::Credential, device::KnownDevice, user::User};
use crate::domain::repository::{
    BackupCodeConsumption, CredentialRepository, DeviceRepository, UserRepository,
};
use crate::domain::value_object::{
    backup_codes::BackupCodeSet, email::Email, public_id::PublicId, totp_secret::TotpSecret,
    user_status::UserStatus,
};
use crate::error::{AuthError, AuthResult};
use kernel::id::{DeviceId, UserId};
use kernel::principal::UserRole;
use platform::password::HashedPassword;

/// PostgreSQL-backed auth repository
///
/// One struct implements the user, credential, and device repositories,
/// mirroring how the tables share a schema and a pool.
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for PgAuthRepository {
    async fn create(&self, user: &User) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id,
                public_id,
                email,
                display_name,
                user_role,
                user_status,
                last_login_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.public_id.as_str())
        .bind(user.email.as_str())
        .bind(&user.display_name)
        .bind(user.user_role.id())
        .bind(user.user_status.id())
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT
                user_id,
                public_id,
                email,
                display_name,
                user_role,
                user_status,
                last_login_at,
                created_at,
                updated_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT
                user_id,
                public_id,
                email,
                display_name,
                user_role,
                user_status,
                last_login_at,
                created_at,
                updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn update(&self, user: &User) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                email = $2,
                display_name = $3,
                user_role = $4,
                user_status = $5,
                last_login_at = $6,
                updated_at = $7
            WHERE user_id = $1
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(&user.display_name)
        .bind(user.user_role.id())
        .bind(user.user_status.id())
        .bind(user.last_login_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Credential Repository Implementation
// ============================================================================

impl CredentialRepository for PgAuthRepository {
    async fn create(&self, credential: &Credential) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (
                user_id,
                password_hash,
                password_expires_at,
                mfa_enabled,
                totp_secret,
                backup_codes,
                backup_codes_used,
                login_failed_count,
                last_failed_at,
                locked_until,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(credential.user_id.as_uuid())
        .bind(credential.password_hash.as_phc_string())
        .bind(credential.password_expires_at)
        .bind(credential.mfa_enabled)
        .bind(credential.totp_secret.as_ref().map(|s| s.as_base32().to_string()))
        .bind(credential.backup_codes.hashes())
        .bind(credential.backup_codes.used())
        .bind(credential.login_failed_count as i16)
        .bind(credential.last_failed_at)
        .bind(credential.locked_until)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> AuthResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT
                user_id,
                password_hash,
                password_expires_at,
                mfa_enabled,
                totp_secret,
                backup_codes,
                backup_codes_used,
                login_failed_count,
                last_failed_at,
                locked_until,
                created_at,
                updated_at
            FROM credentials
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_credential()).transpose()
    }

    async fn update(&self, credential: &Credential) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE credentials SET
                password_hash = $2,
                password_expires_at = $3,
                mfa_enabled = $4,
                totp_secret = $5,
                backup_codes = $6,
                backup_codes_used = $7,
                login_failed_count = $8,
                last_failed_at = $9,
                locked_until = $10,
                updated_at = $11
            WHERE user_id = $1
            "#,
        )
        .bind(credential.user_id.as_uuid())
        .bind(credential.password_hash.as_phc_string())
        .bind(credential.password_expires_at)
        .bind(credential.mfa_enabled)
        .bind(credential.totp_secret.as_ref().map(|s| s.as_base32().to_string()))
        .bind(credential.backup_codes.hashes())
        .bind(credential.backup_codes.used())
        .bind(credential.login_failed_count as i16)
        .bind(credential.last_failed_at)
        .bind(credential.locked_until)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_backup_code(
        &self,
        user_id: &UserId,
        code_hash: &str,
    ) -> AuthResult<BackupCodeConsumption> {
        // The membership check and the append are one UPDATE: two racing
        // calls with the same code cannot both match the WHERE clause.
        let remaining = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE credentials
            SET backup_codes_used = array_append(backup_codes_used, $2),
                updated_at = NOW()
            WHERE user_id = $1
              AND $2 = ANY(backup_codes)
              AND NOT ($2 = ANY(backup_codes_used))
            RETURNING cardinality(backup_codes) - cardinality(backup_codes_used)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(BackupCodeConsumption::Consumed {
                remaining: remaining.max(0) as u32,
            });
        }

        // No row flipped: classify for the caller
        let row = sqlx::query_as::<_, (bool, bool)>(
            r#"
            SELECT $2 = ANY(backup_codes), $2 = ANY(backup_codes_used)
            FROM credentials
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((true, true)) => Ok(BackupCodeConsumption::AlreadyUsed),
            _ => Ok(BackupCodeConsumption::Unknown),
        }
    }
}

// ============================================================================
// Device Repository Implementation
// ============================================================================

impl DeviceRepository for PgAuthRepository {
    async fn find(
        &self,
        user_id: &UserId,
        fingerprint_hash: &[u8],
    ) -> AuthResult<Option<KnownDevice>> {
        let row = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT
                device_id,
                user_id,
                fingerprint_hash,
                last_ip,
                trusted,
                first_seen_at,
                last_seen_at
            FROM user_devices
            WHERE user_id = $1 AND fingerprint_hash = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(fingerprint_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_device()))
    }

    async fn record_seen(
        &self,
        user_id: &UserId,
        fingerprint_hash: &[u8],
        ip: Option<String>,
    ) -> AuthResult<KnownDevice> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, DeviceRow>(
            r#"
            INSERT INTO user_devices (
                device_id,
                user_id,
                fingerprint_hash,
                last_ip,
                trusted,
                first_seen_at,
                last_seen_at
            ) VALUES ($1, $2, $3, $4, FALSE, $5, $5)
            ON CONFLICT (user_id, fingerprint_hash)
            DO UPDATE SET last_ip = EXCLUDED.last_ip, last_seen_at = EXCLUDED.last_seen_at
            RETURNING
                device_id,
                user_id,
                fingerprint_hash,
                last_ip,
                trusted,
                first_seen_at,
                last_seen_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id.as_uuid())
        .bind(fingerprint_hash)
        .bind(ip)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_device())
    }

    async fn mark_trusted(&self, device_id: &DeviceId) -> AuthResult<()> {
        sqlx::query("UPDATE user_devices SET trusted = TRUE WHERE device_id = $1")
            .bind(device_id.as_uuid())
            .execute(&self.pool)
            .await?;

        tracing::info!(device_id = %device_id, "Device marked trusted");
        Ok(())
    }
}

// ============================================================================
// Internal row types for sqlx mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    public_id: String,
    email: String,
    display_name: String,
    user_role: i16,
    user_status: i16,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        Ok(User {
            user_id: UserId::from_uuid(self.user_id),
            public_id: PublicId::parse_str(&self.public_id)?,
            email: Email::from_db(self.email),
            display_name: self.display_name,
            user_role: UserRole::from_id(self.user_role)
                .ok_or_else(|| AuthError::Internal(format!("Unknown role id: {}", self.user_role)))?,
            user_status: UserStatus::from_id(self.user_status).ok_or_else(|| {
                AuthError::Internal(format!("Unknown status id: {}", self.user_status))
            })?,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    user_id: Uuid,
    password_hash: String,
    password_expires_at: Option<DateTime<Utc>>,
    mfa_enabled: bool,
    totp_secret: Option<String>,
    backup_codes: Vec<String>,
    backup_codes_used: Vec<String>,
    login_failed_count: i16,
    last_failed_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CredentialRow {
    fn into_credential(self) -> AuthResult<Credential> {
        let password_hash = HashedPassword::from_phc_string(self.password_hash)
            .map_err(|e| AuthError::Internal(format!("Stored hash invalid: {e}")))?;
        let totp_secret = self.totp_secret.map(TotpSecret::from_base32).transpose()?;

        Ok(Credential {
            user_id: UserId::from_uuid(self.user_id),
            password_hash,
            password_expires_at: self.password_expires_at,
            mfa_enabled: self.mfa_enabled,
            totp_secret,
            backup_codes: BackupCodeSet::from_parts(self.backup_codes, self.backup_codes_used),
            login_failed_count: self.login_failed_count.max(0) as u16,
            last_failed_at: self.last_failed_at,
            locked_until: self.locked_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    device_id: Uuid,
    user_id: Uuid,
    fingerprint_hash: Vec<u8>,
    last_ip: Option<String>,
    trusted: bool,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl DeviceRow {
    fn into_device(self) -> KnownDevice {
        KnownDevice {
            device_id: DeviceId::from_uuid(self.device_id),
            user_id: UserId::from_uuid(self.user_id),
            fingerprint_hash: self.fingerprint_hash,
            last_ip: self.last_ip,
            trusted: self.trusted,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
        }
    }
}
