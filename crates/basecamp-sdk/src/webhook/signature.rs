//! Webhook signature computation and verification.
//!
//! Basecamp signs each delivery with HMAC-SHA256 over the raw request body,
//! keyed by the webhook secret, and sends the lowercase hex digest in the
//! `X-Basecamp-Signature` header. Verification recomputes the digest and
//! compares it with the header in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the signature Basecamp would send for `payload`.
///
/// Returns the lowercase hex HMAC-SHA256 digest.
///
/// # Examples
///
/// ```
/// use basecamp_sdk::webhook::{compute_signature, verify_signature};
///
/// let body = br#"{"id":1,"kind":"todo_created"}"#;
/// let signature = compute_signature(body, "s3cret");
/// assert_eq!(signature.len(), 64);
/// assert!(verify_signature(body, &signature, "s3cret"));
/// ```
pub fn compute_signature(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a delivery signature against the raw body.
///
/// Returns `false` when the secret or the signature is empty. The comparison
/// is over the hex text, so a signature that differs only in letter case is
/// rejected.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }

    let expected = compute_signature(payload, secret);
    constant_time_compare(expected.as_bytes(), signature.as_bytes())
}

/// Compare two byte strings without leaking where they differ.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    // Length is not secret: the expected digest is always 64 bytes.
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// A configured webhook secret.
///
/// Wraps the secret so it never appears in `Debug` output.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign `payload` with this secret.
    pub fn sign(&self, payload: &[u8]) -> String {
        compute_signature(payload, &self.secret)
    }

    /// Verify `signature` for `payload` with this secret.
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        verify_signature(payload, signature, &self.secret)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
