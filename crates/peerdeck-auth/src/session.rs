//! HMAC-signed session cookie values.
//!
//! The cookie value is `<sessionId>.<signature>` where the signature is the
//! URL-safe base64 HMAC-SHA256 of the session id under the process session
//! secret. The session id itself is opaque and resolves through the session
//! store.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie. Changing the cookie name is a code change;
/// external automation relies on this constant.
pub const SESSION_COOKIE: &str = "peerdeck.sid";

/// Generate a fresh random session id (48 hex characters).
#[must_use]
pub fn issue_session_id() -> String {
    let mut bytes = [0_u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Produce the signed cookie value for a session id.
#[must_use]
pub fn sign_session_id(session_id: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(session_id.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{session_id}.{signature}")
}

/// Verify a signed cookie value and return the embedded session id.
///
/// Returns `None` for malformed values and signature mismatches.
#[must_use]
pub fn parse_signed_cookie(value: &str, secret: &str) -> Option<String> {
    let (session_id, signature_b64) = value.split_once('.')?;
    if session_id.is_empty() {
        return None;
    }
    let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(session_id.as_bytes());
    mac.verify_slice(&signature).ok()?;
    Some(session_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_parse_round_trip() {
        let sid = issue_session_id();
        assert_eq!(sid.len(), 48);
        let cookie = sign_session_id(&sid, "secret");
        assert_eq!(parse_signed_cookie(&cookie, "secret"), Some(sid));
    }

    #[test]
    fn wrong_secret_rejects() {
        let cookie = sign_session_id("abc", "secret");
        assert!(parse_signed_cookie(&cookie, "other").is_none());
    }

    #[test]
    fn tampered_values_reject() {
        let cookie = sign_session_id("abc", "secret");
        let tampered = cookie.replace("abc", "abd");
        assert!(parse_signed_cookie(&tampered, "secret").is_none());
        assert!(parse_signed_cookie("no-dot", "secret").is_none());
        assert!(parse_signed_cookie(".sigonly", "secret").is_none());
    }
}
