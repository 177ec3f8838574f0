//! Platform Infrastructure
//!
//! Cross-domain infrastructure shared by the feature crates:
//! - Cryptographic utilities and password hashing (Argon2id + pepper)
//! - Client identification (fingerprints, forwarded IPs)
//! - Fast ephemeral store abstraction (Redis in production, in-memory in
//!   tests) with atomic check-and-mutate primitives
//! - Distributed locking and idempotency guards built on the fast store
//! - Window-based rate limiting with explicit block/unblock

pub mod client;
pub mod crypto;
pub mod faststore;
pub mod lock;
pub mod password;
pub mod rate_limit;
pub mod redis_store;
