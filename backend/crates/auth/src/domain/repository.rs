//! Repository Traits
//!
//! Interfaces for data persistence. Durable state (users, credentials,
//! devices) is implemented in `infra::postgres`; transient state (login
//! transactions, pending enrollments) in `infra::faststore`.

use std::time::Duration;

use crate::domain::entity::{
    auth_tx::AuthTx, credential::Credential, device::KnownDevice, user::User,
};
use crate::domain::value_object::email::Email;
use crate::error::AuthResult;
use kernel::id::{AuthTxId, DeviceId, UserId};

/// User repository trait
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Create a new user
    async fn create(&self, user: &User) -> AuthResult<()>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>>;

    /// Find user by email
    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    /// Update user
    async fn update(&self, user: &User) -> AuthResult<()>;
}

/// Outcome of an atomic backup-code consumption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupCodeConsumption {
    /// Code accepted; this many remain
    Consumed { remaining: u32 },
    /// Code was valid once but has already been spent
    AlreadyUsed,
    /// Code is not part of the stored set
    Unknown,
}

/// Credential repository trait
#[trait_variant::make(CredentialRepository: Send)]
pub trait LocalCredentialRepository {
    /// Create credentials
    async fn create(&self, credential: &Credential) -> AuthResult<()>;

    /// Find credentials by user ID
    async fn find_by_user_id(&self, user_id: &UserId) -> AuthResult<Option<Credential>>;

    /// Update credentials
    async fn update(&self, credential: &Credential) -> AuthResult<()>;

    /// Consume one backup code. The membership check and the append to the
    /// used set MUST be a single atomic step; two concurrent calls with the
    /// same code must not both observe `Consumed`.
    async fn consume_backup_code(
        &self,
        user_id: &UserId,
        code_hash: &str,
    ) -> AuthResult<BackupCodeConsumption>;
}

/// Known-device repository trait
#[trait_variant::make(DeviceRepository: Send)]
pub trait LocalDeviceRepository {
    /// Find a device by its fingerprint hash
    async fn find(
        &self,
        user_id: &UserId,
        fingerprint_hash: &[u8],
    ) -> AuthResult<Option<KnownDevice>>;

    /// Record a sighting, creating the device row on first contact
    async fn record_seen(
        &self,
        user_id: &UserId,
        fingerprint_hash: &[u8],
        ip: Option<String>,
    ) -> AuthResult<KnownDevice>;

    /// Mark a device trusted after successful verification
    async fn mark_trusted(&self, device_id: &DeviceId) -> AuthResult<()>;
}

/// Login transaction store (fast, TTL-bound)
#[trait_variant::make(AuthTxStore: Send)]
pub trait LocalAuthTxStore {
    /// Write the transaction, refreshing its TTL
    async fn put(&self, tx: &AuthTx, ttl: Duration) -> AuthResult<()>;

    /// Read a live transaction
    async fn get(&self, auth_tx_id: AuthTxId) -> AuthResult<Option<AuthTx>>;

    /// Delete a transaction (completion or invalidation)
    async fn delete(&self, auth_tx_id: AuthTxId) -> AuthResult<bool>;
}

/// Pending MFA enrollment, keyed by the hash of the enrollment token
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PendingEnrollment {
    pub user_id: UserId,
    pub totp_secret_base32: String,
}

/// Pending-enrollment store (fast, TTL-bound)
#[trait_variant::make(EnrollmentStore: Send)]
pub trait LocalEnrollmentStore {
    /// Store a pending enrollment under the token hash
    async fn put(
        &self,
        token_hash: &str,
        enrollment: &PendingEnrollment,
        ttl: Duration,
    ) -> AuthResult<()>;

    /// Read a pending enrollment without consuming it (for verification;
    /// a wrong code must not burn the token)
    async fn get(&self, token_hash: &str) -> AuthResult<Option<PendingEnrollment>>;

    /// Take (read-and-remove) a pending enrollment. One-shot: concurrent
    /// takers get it at most once.
    async fn take(&self, token_hash: &str) -> AuthResult<Option<PendingEnrollment>>;
}
