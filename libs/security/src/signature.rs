//! HMAC-SHA256 webhook signatures.
//!
//! The digest is always computed over the exact bytes received on the wire.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Signs `payload` and returns the lowercase hex digest.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `signature` (hex, optionally prefixed with `sha256=`) against the
/// HMAC of `raw_body`. Missing or malformed input yields `false`.
pub fn verify(raw_body: &[u8], signature: Option<&str>, secret: &str) -> bool {
    let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    if secret.is_empty() {
        return false;
    }
    let signature = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    // constant-time comparison
    mac.verify_slice(&provided).is_ok()
}
