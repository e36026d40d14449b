use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while generating, caching, encrypting or compacting
/// cluster credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Key generation, certificate signing or the random source failed.
    #[error("crypto error while {context}: {message}")]
    Crypto { context: String, message: String },

    /// The encryption backend rejected a request for a credential.
    #[error("encryption of {name} failed: {source}")]
    Encryption {
        name: String,
        #[source]
        source: EncryptionError,
    },

    /// Local filesystem failure.
    #[error("failed to {action} {}: {source}", path.display())]
    DiskIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed configuration or certificate spec input.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// gzip or base64 encoding of a credential failed.
    #[error("failed to compact {name}: {source}")]
    Compaction {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl CredentialError {
    pub fn crypto(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Crypto {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn disk_io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::DiskIo {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A failed call to the encryption backend.
///
/// Auth failures, unknown keys, throttling and transport errors all surface
/// as this one type; `code` carries the backend's error code when it sent one.
#[derive(Debug, Error)]
#[error("{operation} with key {key_id} failed ({code}): {message}")]
pub struct EncryptionError {
    pub operation: &'static str,
    pub key_id: String,
    pub code: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, CredentialError>;
