//! Random values for the authorization request and PKCE (RFC 7636)

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure random token
///
/// 32 random bytes (256 bits), base64url encoded without padding, which
/// yields 43 characters from the unreserved set.
pub fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Fresh `state` for one authorization request
pub fn generate_state() -> String {
    random_token()
}

/// Fresh PKCE code verifier
pub fn code_verifier() -> String {
    random_token()
}

/// S256 code challenge: base64url(SHA256(verifier))
pub fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
