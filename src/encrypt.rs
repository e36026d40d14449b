//! Encryption backends for sensitive credentials.
//!
//! [`KmsEncryptService`] talks to AWS KMS; [`DummyEncryptService`] is a
//! reversible local transform for tests and dry runs.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use aws_config::BehaviorVersion;
use aws_sdk_kms::Client;
use aws_sdk_kms::config::Region;
use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_kms::primitives::Blob;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;

use crate::error::EncryptionError;

const ENCRYPT_OPERATION: &str = "Encrypt";
const DECRYPT_OPERATION: &str = "Decrypt";
const UNKNOWN_ERROR_CODE: &str = "Unknown";

/// A symmetric encryption capability keyed by an external key id.
pub trait EncryptService: Send + Sync {
    /// Encrypts `plaintext`, returning an opaque ciphertext blob.
    fn encrypt(
        &self,
        plaintext: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, EncryptionError>> + Send;

    /// Reverses [`EncryptService::encrypt`].
    fn decrypt(
        &self,
        ciphertext: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, EncryptionError>> + Send;
}

/// Where and with which key KMS requests are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsConfig {
    pub region: String,
    pub key_arn: String,
    /// Overrides the regional KMS endpoint, e.g. for a VPC endpoint.
    pub endpoint_url: Option<String>,
}

pub struct KmsEncryptService {
    client: Client,
    key_arn: String,
}

impl KmsEncryptService {
    /// Builds a client from the default AWS credential chain.
    pub async fn new(config: &KmsConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let shared = loader.load().await;
        Self::from_client(Client::new(&shared), config.key_arn.clone())
    }

    #[must_use]
    pub fn from_client(client: Client, key_arn: impl Into<String>) -> Self {
        Self {
            client,
            key_arn: key_arn.into(),
        }
    }

    fn error<E>(&self, operation: &'static str, err: &E) -> EncryptionError
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        EncryptionError {
            operation,
            key_id: self.key_arn.clone(),
            code: err.code().unwrap_or(UNKNOWN_ERROR_CODE).to_string(),
            message: err
                .message()
                .map_or_else(|| DisplayErrorContext(err).to_string(), str::to_string),
        }
    }

    fn empty_response(&self, operation: &'static str) -> EncryptionError {
        EncryptionError {
            operation,
            key_id: self.key_arn.clone(),
            code: UNKNOWN_ERROR_CODE.to_string(),
            message: "response carried no data".to_string(),
        }
    }
}

impl EncryptService for KmsEncryptService {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        debug!("Encrypting {} bytes with KMS key {}", plaintext.len(), self.key_arn);
        let output = self
            .client
            .encrypt()
            .key_id(&self.key_arn)
            .plaintext(Blob::new(plaintext))
            .send()
            .await
            .map_err(|e| self.error(ENCRYPT_OPERATION, &e))?;
        output
            .ciphertext_blob()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| self.empty_response(ENCRYPT_OPERATION))
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let output = self
            .client
            .decrypt()
            .key_id(&self.key_arn)
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|e| self.error(DECRYPT_OPERATION, &e))?;
        output
            .plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| self.empty_response(DECRYPT_OPERATION))
    }
}

const DUMMY_KEY_ID: &str = "dummy";
const NONCE_BYTES: usize = 8;

/// XORs the payload with a keystream derived from a per-call nonce.
///
/// The nonce is prepended to the ciphertext, so every call yields a
/// different ciphertext for the same plaintext and decryption needs no state.
pub struct DummyEncryptService {
    counter: AtomicU64,
}

impl DummyEncryptService {
    /// # Errors
    /// Returns an error if the system random source fails.
    pub fn new() -> Result<Self, EncryptionError> {
        let mut seed = [0u8; NONCE_BYTES];
        SystemRandom::new()
            .fill(&mut seed)
            .map_err(|_| EncryptionError {
                operation: "Seed",
                key_id: DUMMY_KEY_ID.to_string(),
                code: UNKNOWN_ERROR_CODE.to_string(),
                message: "random source failed".to_string(),
            })?;
        Ok(Self {
            counter: AtomicU64::new(u64::from_be_bytes(seed)),
        })
    }

    fn apply_keystream(nonce: [u8; NONCE_BYTES], data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, byte)| {
                let pad = nonce[i % NONCE_BYTES].wrapping_add(i.to_le_bytes()[0]);
                byte ^ pad
            })
            .collect()
    }
}

impl EncryptService for DummyEncryptService {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let nonce = self.counter.fetch_add(1, Ordering::Relaxed).to_be_bytes();
        let mut ciphertext = nonce.to_vec();
        ciphertext.extend(Self::apply_keystream(nonce, plaintext));
        Ok(ciphertext)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let Some((nonce, payload)) = ciphertext.split_first_chunk::<NONCE_BYTES>() else {
            return Err(EncryptionError {
                operation: DECRYPT_OPERATION,
                key_id: DUMMY_KEY_ID.to_string(),
                code: "InvalidCiphertextException".to_string(),
                message: format!("ciphertext shorter than {NONCE_BYTES} bytes"),
            });
        };
        Ok(Self::apply_keystream(*nonce, payload))
    }
}
