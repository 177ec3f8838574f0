//! Domain Entities

pub mod auth_tx;
pub mod credential;
pub mod device;
pub mod user;
