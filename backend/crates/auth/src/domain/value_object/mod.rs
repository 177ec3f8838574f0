//! Value Objects

pub mod backup_codes;
pub mod email;
pub mod public_id;
pub mod totp_secret;
pub mod user_status;
