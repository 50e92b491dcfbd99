//! PKCE verifier/challenge pairs and CSRF state values.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

/// The only challenge method produced by [`Pkce::generate`].
pub const CHALLENGE_METHOD: &str = "S256";

/// A PKCE code verifier and its S256 challenge.
///
/// Send `challenge` with `code_challenge_method=S256` in the authorization
/// request, and `verifier` as `code_verifier` in the code exchange.
///
/// # Examples
///
/// ```
/// use basecamp_sdk::oauth::Pkce;
///
/// let pkce = Pkce::generate();
/// assert_eq!(pkce.verifier().len(), 43);
/// assert_eq!(pkce.challenge().len(), 43);
/// ```
#[derive(Clone)]
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    /// Generate a verifier from 32 random bytes (base64url, no padding).
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Derive the challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn challenge_method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"<REDACTED>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Generate an OAuth `state` value from 16 random bytes (base64url, no padding).
///
/// Store it before redirecting to the authorization endpoint and compare it
/// with the value returned to the callback.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
#[path = "pkce_tests.rs"]
mod tests;
