//! Client identification utilities
//!
//! Common functions for identifying clients via HTTP headers.
//!
//! Two hashes are derived per request:
//! - `device_hash` over the User-Agent alone: device identity. Sessions and
//!   known-device rows key on it, so it must survive IP changes.
//! - `binding_hash` over client IP + User-Agent: login-transaction binding.
//!   A transaction id presented from another address or agent is rejected.

use axum::http::{HeaderMap, header};
use std::net::IpAddr;

use crate::crypto::{sha256, to_base64};

/// Client fingerprint derived from request headers
#[derive(Debug, Clone)]
pub struct ClientFingerprint {
    /// SHA-256 of the User-Agent (device identity)
    pub device_hash: [u8; 32],
    /// SHA-256 over client IP + User-Agent (login-transaction binding)
    pub binding_hash: [u8; 32],
    /// Client IP address (from X-Forwarded-For or direct connection)
    pub ip: Option<IpAddr>,
    /// Original User-Agent string (for logging/display)
    pub user_agent: Option<String>,
}

impl ClientFingerprint {
    pub fn new(
        device_hash: [u8; 32],
        binding_hash: [u8; 32],
        ip: Option<IpAddr>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            device_hash,
            binding_hash,
            ip,
            user_agent,
        }
    }

    /// Device hash as Vec<u8> (for database storage)
    pub fn device_hash_vec(&self) -> Vec<u8> {
        self.device_hash.to_vec()
    }

    /// Binding hash as base64 (for fast-store records)
    pub fn binding_hash_b64(&self) -> String {
        to_base64(&self.binding_hash)
    }

    /// Get IP as string (for database storage)
    pub fn ip_string(&self) -> Option<String> {
        self.ip.map(|ip| ip.to_string())
    }
}

/// Error when extracting client fingerprint
#[derive(Debug, Clone, thiserror::Error)]
pub enum FingerprintError {
    #[error("Missing required header: {0}")]
    MissingHeader(String),
}

/// Compute the login-transaction binding hash for a client context
///
/// The IP part uses the canonical string form so proxied and direct
/// connections agree.
pub fn binding_hash(ip: Option<IpAddr>, user_agent: &str) -> [u8; 32] {
    let mut material = Vec::with_capacity(64);
    if let Some(ip) = ip {
        material.extend_from_slice(ip.to_string().as_bytes());
    }
    material.push(b'|');
    material.extend_from_slice(user_agent.as_bytes());
    sha256(&material)
}

/// Extract client fingerprint from request headers
///
/// ## Arguments
/// * `headers` - HTTP request headers
/// * `client_ip` - Client IP address (from connection or X-Forwarded-For)
///
/// ## Returns
/// * `Ok(ClientFingerprint)` - Successfully extracted fingerprint
/// * `Err(FingerprintError)` - Missing User-Agent header
pub fn extract_fingerprint(
    headers: &HeaderMap,
    client_ip: Option<IpAddr>,
) -> Result<ClientFingerprint, FingerprintError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| FingerprintError::MissingHeader("User-Agent".to_string()))?;

    Ok(ClientFingerprint::new(
        sha256(user_agent.as_bytes()),
        binding_hash(client_ip, user_agent),
        client_ip,
        Some(user_agent.to_string()),
    ))
}

/// Extract client IP address from headers
///
/// Checks X-Forwarded-For header first (for reverse proxy setups),
/// then falls back to direct connection IP.
pub fn extract_client_ip(headers: &HeaderMap, direct_ip: Option<IpAddr>) -> Option<IpAddr> {
    // Check X-Forwarded-For header (first IP in the list)
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first_ip) = xff.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }
    direct_ip
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_fingerprint() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 Test Browser"),
        );

        let fp = extract_fingerprint(&headers, None).unwrap();
        assert_eq!(fp.device_hash.len(), 32);
        assert_eq!(fp.user_agent, Some("Mozilla/5.0 Test Browser".to_string()));
    }

    #[test]
    fn test_extract_fingerprint_missing_ua() {
        let headers = HeaderMap::new();
        let result = extract_fingerprint(&headers, None);
        assert!(matches!(result, Err(FingerprintError::MissingHeader(_))));
    }

    #[test]
    fn test_device_hash_ignores_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("agent-a"));

        let fp1 = extract_fingerprint(&headers, "192.168.1.1".parse().ok()).unwrap();
        let fp2 = extract_fingerprint(&headers, "192.168.1.2".parse().ok()).unwrap();

        assert_eq!(fp1.device_hash, fp2.device_hash);
        assert_ne!(fp1.binding_hash, fp2.binding_hash);
    }

    #[test]
    fn test_binding_hash_varies_with_ip() {
        let ua = "Mozilla/5.0 Test Browser";
        let h1 = binding_hash("192.168.1.1".parse().ok(), ua);
        let h2 = binding_hash("192.168.1.2".parse().ok(), ua);
        let h3 = binding_hash("192.168.1.1".parse().ok(), ua);

        assert_ne!(h1, h2);
        assert_eq!(h1, h3);
    }

    #[test]
    fn test_binding_hash_varies_with_user_agent() {
        let ip = "10.0.0.1".parse().ok();
        let h1 = binding_hash(ip, "agent-a");
        let h2 = binding_hash(ip, "agent-b");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_extract_client_ip_xff() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );

        let ip = extract_client_ip(&headers, None);
        assert_eq!(ip, Some("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_direct() {
        let headers = HeaderMap::new();
        let direct: IpAddr = "127.0.0.1".parse().unwrap();

        let ip = extract_client_ip(&headers, Some(direct));
        assert_eq!(ip, Some(direct));
    }
}
