//! HMAC-SHA256 request signing.
//!
//! Signatures take the form `sha256=<hex>` and are computed over the exact
//! payload bytes that go on the wire. An empty secret never yields a
//! signature; the caller has to treat it as a configuration failure.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signing and verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// No signing secret configured.
    #[error("Missing GDC_WEBHOOK_SECRET")]
    MissingSecret,
    /// Signature not in `sha256=<hex>` form.
    #[error("invalid signature format: {0}")]
    InvalidFormat(String),
    /// Signature does not match the payload.
    #[error("signature verification failed")]
    VerificationFailed,
    /// Key could not be used for HMAC.
    #[error("invalid secret key")]
    InvalidSecret,
}

/// Signs `payload` with `secret`.
///
/// # Errors
///
/// Returns `SignatureError::MissingSecret` if `secret` is empty.
pub fn sign(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }

    Ok(format!("{SIGNATURE_PREFIX}{}", generate_hmac_hex(payload, secret)?))
}

/// HMAC-SHA256 of `payload` as lowercase hex.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the key is rejected.
pub fn generate_hmac_hex(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;

    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a `sha256=<hex>` signature against `payload`.
///
/// # Errors
///
/// Returns `SignatureError::InvalidFormat` for a malformed header,
/// `SignatureError::MissingSecret` for an empty secret and
/// `SignatureError::VerificationFailed` on mismatch.
pub fn verify(payload: &[u8], signature: &str, secret: &str) -> Result<(), SignatureError> {
    let hex_signature = signature.strip_prefix(SIGNATURE_PREFIX).ok_or_else(|| {
        SignatureError::InvalidFormat(format!("expected 'sha256=<hex>', got: {signature}"))
    })?;

    let expected = sign(payload, secret)?;
    let expected_hex = &expected[SIGNATURE_PREFIX.len()..];

    if timing_safe_eq(hex_signature, expected_hex) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

/// Constant-time comparison for equal-length inputs.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_has_prefix_and_hex_digest() {
        let signature = sign(b"{\"a\":1}", "topsecret").unwrap();

        let hex = signature.strip_prefix(SIGNATURE_PREFIX).unwrap();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_vector_matches() {
        // RFC 4231 test case 2.
        let hex = generate_hmac_hex(b"what do ya want for nothing?", "Jefe").unwrap();
        assert_eq!(hex, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn empty_secret_is_refused() {
        assert_eq!(sign(b"payload", ""), Err(SignatureError::MissingSecret));
        assert_eq!(SignatureError::MissingSecret.to_string(), "Missing GDC_WEBHOOK_SECRET");
    }

    #[test]
    fn verify_round_trip_and_tamper() {
        let signature = sign(b"payload", "secret").unwrap();

        assert_eq!(verify(b"payload", &signature, "secret"), Ok(()));
        let mismatch = Err(SignatureError::VerificationFailed);
        assert_eq!(verify(b"payload!", &signature, "secret"), mismatch);
        assert_eq!(verify(b"payload", &signature, "other"), mismatch);
        assert!(matches!(
            verify(b"payload", "v1=abc", "secret"),
            Err(SignatureError::InvalidFormat(_))
        ));
    }
}
