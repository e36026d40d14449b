//! On-disk credential files and their encrypted siblings.

pub mod bundle;
pub mod credential;

use std::fmt;

pub use bundle::AssetsOnDisk;
pub use credential::{CachedEncryptor, read_or_create_raw};

pub const CA_CERT_FILE: &str = "ca.pem";
pub const CA_KEY_FILE: &str = "ca-key.pem";
pub const AUTH_TOKENS_FILE: &str = "tokens.csv";
pub const TLS_BOOTSTRAP_TOKEN_FILE: &str = "kubelet-tls-bootstrap-token";
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Leaf certificates every cluster carries, in issuance order.
pub const LEAF_NAMES: [&str; 5] = ["apiserver", "worker", "admin", "etcd", "etcd-client"];
pub const DEX_LEAF_NAME: &str = "dex";

#[must_use]
pub fn cert_file_name(leaf: &str) -> String {
    format!("{leaf}.pem")
}

#[must_use]
pub fn key_file_name(leaf: &str) -> String {
    format!("{leaf}-key.pem")
}

#[must_use]
pub fn encrypted_file_name(name: &str) -> String {
    format!("{name}{ENCRYPTED_SUFFIX}")
}

/// Credential bytes (PEM or token) under their logical file name.
#[derive(Clone, PartialEq, Eq)]
pub struct RawCredential {
    name: String,
    bytes: Vec<u8>,
}

impl RawCredential {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// Keys and tokens must never end up in logs.
impl fmt::Debug for RawCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCredential")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}
