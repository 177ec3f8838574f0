//! Security Monitor
//!
//! Heuristic risk classification for a password-verified login. The
//! resulting snapshot is frozen into the login transaction and decides
//! which challenge the client must pass.

use std::sync::Arc;

use platform::client::ClientFingerprint;
use platform::faststore::FastStore;
use platform::rate_limit::RateLimiter;

use crate::application::config::AuthConfig;
use crate::domain::entity::auth_tx::{RiskLevel, RiskSnapshot};
use crate::domain::entity::user::User;
use crate::domain::repository::DeviceRepository;
use crate::error::AuthResult;

/// Rate-limit kind shared with the login counters; the monitor reads the
/// same window it was counted into
pub const LOGIN_EMAIL_KIND: &str = "login:email";

/// Security monitor
pub struct SecurityMonitor<D, F>
where
    D: DeviceRepository,
    F: FastStore + Sync,
{
    devices: Arc<D>,
    limiter: Arc<RateLimiter<F>>,
    config: Arc<AuthConfig>,
}

impl<D, F> SecurityMonitor<D, F>
where
    D: DeviceRepository,
    F: FastStore + Sync,
{
    pub fn new(devices: Arc<D>, limiter: Arc<RateLimiter<F>>, config: Arc<AuthConfig>) -> Self {
        Self {
            devices,
            limiter,
            config,
        }
    }

    /// Classify the risk of this login
    pub async fn evaluate(
        &self,
        user: &User,
        fingerprint: &ClientFingerprint,
    ) -> AuthResult<RiskSnapshot> {
        let device = self
            .devices
            .find(&user.user_id, &fingerprint.device_hash)
            .await?;

        let (new_device, new_ip) = match &device {
            None => (true, true),
            Some(device) if !device.trusted => (true, device.last_ip != fingerprint.ip_string()),
            Some(device) => (false, device.last_ip != fingerprint.ip_string()),
        };

        // Velocity reads the same window start_login counted into
        let window = self
            .limiter
            .record(
                LOGIN_EMAIL_KIND,
                user.email.as_str(),
                &self.config.email_rate_limit,
            )
            .await?;
        let velocity_suspicious = window.count >= self.config.velocity_threshold;

        let level = if new_device && velocity_suspicious {
            RiskLevel::High
        } else if new_device || new_ip || velocity_suspicious {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let snapshot = RiskSnapshot {
            new_device,
            new_ip,
            velocity_suspicious,
            level,
        };

        if snapshot.level > RiskLevel::Low {
            tracing::info!(
                user_id = %user.user_id,
                new_device = snapshot.new_device,
                new_ip = snapshot.new_ip,
                velocity = snapshot.velocity_suspicious,
                level = ?snapshot.level,
                "Elevated login risk"
            );
        }

        Ok(snapshot)
    }
}
