//! HMAC-SHA1 signing for forwarded webhook payloads.
//!
//! App Center's public hook endpoint authenticates GitHub-style deliveries:
//! the body is signed with the app's secret and the digest is sent as
//! `X-Hub-Signature: sha1=<hex>`.

use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;
use tracing::debug;

use crate::error::{AppCenterError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha1=";

/// Sign the compact JSON serialization of `payload` with `secret`.
///
/// Returns the lowercase hex digest. Fails only if `payload` cannot be
/// serialized.
pub fn sign<T: Serialize + ?Sized>(payload: &T, secret: &str) -> Result<String> {
    let body = serde_json::to_vec(payload)?;
    sign_bytes(&body, secret)
}

/// Sign an already serialized body.
pub fn sign_bytes(body: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| AppCenterError::ConfigError(format!("Unusable app secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Header value for a hex digest: `sha1=<hex>`.
pub fn signature_header_value(hex_digest: &str) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex_digest)
}

/// Check a `sha1=<hex>` header against `body` signed with `secret`.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let Ok(expected) = hex_decode(hex_digest) else {
        debug!("Signature header is not valid hex");
        return false;
    };

    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // verify_slice compares in constant time
    mac.verify_slice(&expected).is_ok()
}
