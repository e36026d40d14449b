use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use super::credential::{CachedEncryptor, read_or_create_raw};
use super::{
    AUTH_TOKENS_FILE, CA_CERT_FILE, DEX_LEAF_NAME, LEAF_NAMES, TLS_BOOTSTRAP_TOKEN_FILE,
    cert_file_name, key_file_name,
};
use crate::compact::{CompactAssets, compact};
use crate::encrypt::EncryptService;
use crate::error::{CredentialError, Result};
use crate::token::new_random_token;

/// Default contents of `tokens.csv`: no static API tokens.
pub const DEFAULT_AUTH_TOKENS: &[u8] = b"";

/// Every credential the userdata renderer embeds, keyed by file name.
///
/// Private keys and tokens hold ciphertext when the bundle was read through
/// [`AssetsOnDisk::read_or_encrypt`]. The CA private key is never included.
#[derive(Debug, Default)]
pub struct AssetsOnDisk {
    files: BTreeMap<String, Vec<u8>>,
}

impl AssetsOnDisk {
    /// Reads the plaintext bundle, creating missing token files.
    ///
    /// # Errors
    /// Returns a disk error if a certificate or key is missing or unreadable.
    pub async fn read_raw(dir: &Path, manage_certificates: bool, include_dex: bool) -> Result<Self> {
        let mut files = BTreeMap::new();
        if manage_certificates {
            for name in certificate_files(include_dex)
                .into_iter()
                .chain(private_key_files(include_dex))
            {
                let raw = read_or_create_raw(dir, &name, None).await?;
                files.insert(name, raw.into_bytes());
            }
        }
        let bootstrap_token = new_random_token()?;
        for (name, default) in token_defaults(&bootstrap_token) {
            let raw = read_or_create_raw(dir, name, Some(default)).await?;
            files.insert(name.to_string(), raw.into_bytes());
        }
        debug!("Read {} raw assets from {}", files.len(), dir.display());
        Ok(Self { files })
    }

    /// Reads the bundle with private keys and tokens replaced by their
    /// ciphertext, encrypting and caching whatever has no `.enc` sibling yet.
    ///
    /// # Errors
    /// Returns a disk error if a file is missing or unreadable, or an
    /// encryption error if the backend rejects a credential.
    pub async fn read_or_encrypt<E: EncryptService>(
        dir: &Path,
        manage_certificates: bool,
        include_dex: bool,
        encryptor: &CachedEncryptor<E>,
    ) -> Result<Self> {
        let mut files = BTreeMap::new();
        if manage_certificates {
            for name in certificate_files(include_dex) {
                let raw = read_or_create_raw(dir, &name, None).await?;
                files.insert(name, raw.into_bytes());
            }
            for name in private_key_files(include_dex) {
                let ciphertext = encryptor.read_or_create_encrypted(dir, &name, None).await?;
                files.insert(name, ciphertext);
            }
        }
        let bootstrap_token = new_random_token()?;
        for (name, default) in token_defaults(&bootstrap_token) {
            let ciphertext = encryptor
                .read_or_create_encrypted(dir, name, Some(default))
                .await?;
            files.insert(name.to_string(), ciphertext);
        }
        debug!("Read {} encrypted assets from {}", files.len(), dir.display());
        Ok(Self { files })
    }

    /// gzip+base64 encodes every credential; absent ones stay empty.
    ///
    /// # Errors
    /// Returns a compaction error naming the credential that failed.
    pub fn compact(&self) -> Result<CompactAssets> {
        let leaf = |name: &str| -> Result<(String, String)> {
            Ok((
                self.compact_file(&cert_file_name(name))?,
                self.compact_file(&key_file_name(name))?,
            ))
        };
        let (apiserver_cert, apiserver_key) = leaf("apiserver")?;
        let (worker_cert, worker_key) = leaf("worker")?;
        let (admin_cert, admin_key) = leaf("admin")?;
        let (etcd_cert, etcd_key) = leaf("etcd")?;
        let (etcd_client_cert, etcd_client_key) = leaf("etcd-client")?;
        let (dex_cert, dex_key) = leaf(DEX_LEAF_NAME)?;

        Ok(CompactAssets {
            ca_cert: self.compact_file(CA_CERT_FILE)?,
            apiserver_cert,
            apiserver_key,
            worker_cert,
            worker_key,
            admin_cert,
            admin_key,
            etcd_cert,
            etcd_key,
            etcd_client_cert,
            etcd_client_key,
            dex_cert,
            dex_key,
            auth_tokens: self.compact_file(AUTH_TOKENS_FILE)?,
            tls_bootstrap_token: self.compact_file(TLS_BOOTSTRAP_TOKEN_FILE)?,
        })
    }

    fn compact_file(&self, name: &str) -> Result<String> {
        let Some(bytes) = self.files.get(name) else {
            return Ok(String::new());
        };
        compact(bytes).map_err(|source| CredentialError::Compaction {
            name: name.to_string(),
            source,
        })
    }
}

fn leaf_names(include_dex: bool) -> Vec<&'static str> {
    let mut names = LEAF_NAMES.to_vec();
    if include_dex {
        names.push(DEX_LEAF_NAME);
    }
    names
}

fn certificate_files(include_dex: bool) -> Vec<String> {
    std::iter::once(CA_CERT_FILE.to_string())
        .chain(leaf_names(include_dex).into_iter().map(cert_file_name))
        .collect()
}

fn private_key_files(include_dex: bool) -> Vec<String> {
    leaf_names(include_dex).into_iter().map(key_file_name).collect()
}

fn token_defaults(bootstrap_token: &str) -> [(&'static str, &[u8]); 2] {
    [
        (AUTH_TOKENS_FILE, DEFAULT_AUTH_TOKENS),
        (TLS_BOOTSTRAP_TOKEN_FILE, bootstrap_token.as_bytes()),
    ]
}
