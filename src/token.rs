use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{CredentialError, Result};

/// Random bytes behind each kubelet TLS bootstrap token.
pub const TLS_BOOTSTRAP_TOKEN_BYTES: usize = 256;

/// Generates a URL-safe base64 token from [`TLS_BOOTSTRAP_TOKEN_BYTES`] random bytes.
///
/// # Errors
/// Returns a crypto error if the system random source fails.
pub fn new_random_token() -> Result<String> {
    let mut buffer = vec![0u8; TLS_BOOTSTRAP_TOKEN_BYTES];
    SystemRandom::new()
        .fill(&mut buffer)
        .map_err(|_| CredentialError::crypto("generating a bootstrap token", "random source failed"))?;
    Ok(URL_SAFE.encode(buffer))
}
