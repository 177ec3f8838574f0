//! Access Token Codec
//!
//! Access tokens are `{session_id}.{signature}` where the signature is the
//! URL-safe base64 of HMAC-SHA256 over the session id. Verification happens
//! before any datastore lookup, so forged tokens cost nothing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use kernel::id::SessionId;

type HmacSha256 = Hmac<Sha256>;

/// Sign a session id into a bearer access token
pub fn sign_access_token(secret: &[u8; 32], session_id: SessionId) -> String {
    let session_id = session_id.to_string();

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(session_id.as_bytes());
    let signature = mac.finalize().into_bytes();

    format!("{}.{}", session_id, URL_SAFE_NO_PAD.encode(signature))
}

/// Verify a bearer access token and recover its session id
pub fn verify_access_token(secret: &[u8; 32], token: &str) -> Option<SessionId> {
    let (session_id_str, signature_b64) = token.split_once('.')?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(session_id_str.as_bytes());

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
    mac.verify_slice(&signature).ok()?;

    SessionId::parse(session_id_str).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let secret = [7u8; 32];
        let session_id = SessionId::new();

        let token = sign_access_token(&secret, session_id);
        assert_eq!(verify_access_token(&secret, &token), Some(session_id));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let session_id = SessionId::new();
        let token = sign_access_token(&[7u8; 32], session_id);
        assert_eq!(verify_access_token(&[8u8; 32], &token), None);
    }

    #[test]
    fn test_tampered_session_id_rejected() {
        let secret = [7u8; 32];
        let token = sign_access_token(&secret, SessionId::new());

        let (_, signature) = token.split_once('.').unwrap();
        let forged = format!("{}.{}", SessionId::new(), signature);
        assert_eq!(verify_access_token(&secret, &forged), None);
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let secret = [7u8; 32];
        assert_eq!(verify_access_token(&secret, ""), None);
        assert_eq!(verify_access_token(&secret, "no-dot-here"), None);
        assert_eq!(verify_access_token(&secret, "a.b.c"), None);
        assert_eq!(verify_access_token(&secret, "not-a-uuid.!!!"), None);
    }
}
