//! Cryptographic utilities for webhook verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// How far a signature timestamp may be from the current time, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Why a `Stripe-Signature` header was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// No `t=` element in the header.
    #[error("missing timestamp")]
    MissingTimestamp,

    /// The `t=` element is not a Unix timestamp.
    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// The timestamp is outside the tolerance window.
    #[error("timestamp outside the tolerance window")]
    Expired,

    /// No `v1=` element in the header.
    #[error("missing v1 signature")]
    MissingSignature,

    /// No `v1` signature matches the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Compute HMAC-SHA256 and return hex-encoded result.
///
/// # Panics
///
/// Never in practice: HMAC-SHA256 accepts keys of any size (RFC 2104).
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Verify a `Stripe-Signature` header (`t=<ts>,v1=<sig>[,v1=<sig>...]`)
/// against the raw request body.
///
/// The signed payload is `"{t}.{body}"`. `t` must be within
/// [`SIGNATURE_TOLERANCE_SECS`] of `now` (Unix seconds).
///
/// # Errors
///
/// Returns a [`SignatureError`] describing why the header was rejected.
pub fn verify_stripe_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if now.abs_diff(signed_at) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));
    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build a `Stripe-Signature` header for `payload` at `timestamp`.
#[must_use]
pub fn sign_stripe_payload(payload: &str, timestamp: i64, secret: &str) -> String {
    let signature = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));
    format!("t={timestamp},v1={signature}")
}
