use rcgen::KeyPair;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};

use crate::error::{CredentialError, Result};

pub const RSA_KEY_BITS: usize = 2048;

const PKCS1_RSA_LABEL: &str = "BEGIN RSA PRIVATE KEY";

/// Generates a fresh RSA-2048 key pair usable for signing certificates.
///
/// # Errors
/// Returns a crypto error if key generation or conversion fails.
pub fn new_private_key() -> Result<KeyPair> {
    let mut rng = rand::rngs::OsRng;
    let key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| CredentialError::crypto("generating an RSA private key", e))?;
    to_key_pair(&key)
}

/// Parses a PEM private key in PKCS#8 or PKCS#1 (`RSA PRIVATE KEY`) form.
///
/// # Errors
/// Returns a crypto error if the PEM cannot be parsed as a supported key.
pub fn parse_private_key(pem: &str) -> Result<KeyPair> {
    if pem.contains(PKCS1_RSA_LABEL) {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| CredentialError::crypto("parsing a PKCS#1 private key", e))?;
        return to_key_pair(&key);
    }
    KeyPair::from_pem(pem).map_err(|e| CredentialError::crypto("parsing a private key", e))
}

fn to_key_pair(key: &RsaPrivateKey) -> Result<KeyPair> {
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CredentialError::crypto("encoding an RSA private key", e))?;
    KeyPair::from_pem(&pem).map_err(|e| CredentialError::crypto("loading an RSA private key", e))
}
