use std::io;
use std::path::Path;

use tracing::{debug, info};

use super::{RawCredential, encrypted_file_name};
use crate::encrypt::EncryptService;
use crate::error::{CredentialError, Result};
use crate::fs_util::{read_if_exists, write_credential_file};

/// Returns `dir/name` verbatim if present, otherwise persists `default`.
///
/// # Errors
/// Returns a disk error if the file cannot be read or written, or if it is
/// absent and no default was supplied.
pub async fn read_or_create_raw(
    dir: &Path,
    name: &str,
    default: Option<&[u8]>,
) -> Result<RawCredential> {
    let path = dir.join(name);
    if let Some(existing) = read_if_exists(&path).await? {
        debug!("Reusing {}", path.display());
        return Ok(RawCredential::new(name, existing));
    }
    let Some(default) = default else {
        return Err(CredentialError::disk_io(
            "read",
            path,
            io::Error::from(io::ErrorKind::NotFound),
        ));
    };
    write_credential_file(&path, default).await?;
    debug!("Created {}", path.display());
    Ok(RawCredential::new(name, default))
}

/// Encrypts credentials at most once, caching ciphertext in `<name>.enc`.
pub struct CachedEncryptor<E> {
    service: E,
}

impl<E: EncryptService> CachedEncryptor<E> {
    pub fn new(service: E) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &E {
        &self.service
    }

    /// Returns the ciphertext of `dir/name`, encrypting and caching it on first use.
    ///
    /// An existing `.enc` file is authoritative and returned verbatim. Otherwise
    /// the plaintext is read (or created from `default`), encrypted and persisted.
    ///
    /// # Errors
    /// Returns a disk error on filesystem failure and an encryption error,
    /// naming the credential, when the backend rejects the request.
    pub async fn read_or_create_encrypted(
        &self,
        dir: &Path,
        name: &str,
        default: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        if let Some(cached) = read_if_exists(&dir.join(encrypted_file_name(name))).await? {
            debug!("Reusing encrypted {name}");
            return Ok(cached);
        }
        let raw = read_or_create_raw(dir, name, default).await?;
        self.encrypt_and_cache(dir, &raw).await
    }

    /// Encrypts `raw` and writes the ciphertext next to its plaintext file.
    ///
    /// Empty credentials are never sent to the backend; their ciphertext is
    /// empty and nothing is written.
    ///
    /// # Errors
    /// Returns an encryption error on backend failure or a disk error if the
    /// ciphertext cannot be written.
    pub async fn encrypt_and_cache(&self, dir: &Path, raw: &RawCredential) -> Result<Vec<u8>> {
        if raw.is_empty() {
            debug!("Skipping encryption of empty {}", raw.name());
            return Ok(Vec::new());
        }
        let ciphertext = self
            .service
            .encrypt(raw.bytes())
            .await
            .map_err(|source| CredentialError::Encryption {
                name: raw.name().to_string(),
                source,
            })?;
        let path = dir.join(encrypted_file_name(raw.name()));
        write_credential_file(&path, &ciphertext).await?;
        info!("Encrypted {} into {}", raw.name(), path.display());
        Ok(ciphertext)
    }
}
