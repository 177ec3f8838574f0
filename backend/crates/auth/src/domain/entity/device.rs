//! Known Device Entity
//!
//! One row per (user, client fingerprint). The security monitor reads these
//! to classify new-device/new-IP risk; a completed device verification
//! marks the device trusted.

use chrono::{DateTime, Utc};

use kernel::id::{DeviceId, UserId};

/// Known device entity
#[derive(Debug, Clone)]
pub struct KnownDevice {
    pub device_id: DeviceId,
    pub user_id: UserId,
    /// Client binding hash (IP + User-Agent)
    pub fingerprint_hash: Vec<u8>,
    /// IP seen most recently from this device
    pub last_ip: Option<String>,
    /// Set after a successful device verification
    pub trusted: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl KnownDevice {
    pub fn new(user_id: UserId, fingerprint_hash: Vec<u8>, last_ip: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            device_id: DeviceId::new(),
            user_id,
            fingerprint_hash,
            last_ip,
            trusted: false,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Record another sighting of this device
    pub fn record_seen(&mut self, ip: Option<String>) {
        self.last_ip = ip;
        self.last_seen_at = Utc::now();
    }
}
