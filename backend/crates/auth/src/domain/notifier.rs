//! Notifier Collaborator
//!
//! Delivery of one-time codes is an external concern; this crate only
//! defines the interface. Mail/SMS transport lives outside the core.

use crate::domain::value_object::email::Email;
use crate::error::AuthResult;

/// Outbound notification interface
#[trait_variant::make(Notifier: Send)]
pub trait LocalNotifier {
    /// Deliver a device-verification one-time code
    async fn send_device_verification(&self, email: &Email, code: &str) -> AuthResult<()>;
}

/// Development notifier: logs instead of sending
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    async fn send_device_verification(&self, email: &Email, _code: &str) -> AuthResult<()> {
        // The code itself stays out of the logs
        tracing::info!(email = %email, "Device verification code dispatched (dev notifier)");
        Ok(())
    }
}
