//! gzip + base64 encoding of credentials for inline embedding in userdata.

use std::io::{self, Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

/// gzip-compresses `data` and base64-encodes the stream.
///
/// Empty input yields an empty string; some credentials are legitimately absent.
///
/// # Errors
/// Returns an error if the gzip writer fails.
pub fn compact(data: &[u8]) -> io::Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Reverses [`compact`].
///
/// # Errors
/// Returns an error if the input is not base64 or not a gzip stream.
pub fn decompact(encoded: &str) -> io::Result<Vec<u8>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }
    let compressed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut decoded = Vec::new();
    GzDecoder::new(compressed.as_slice()).read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Compacted credentials handed to the userdata renderer.
///
/// Certificates are compacted from plaintext; private keys and tokens are
/// compacted from their encrypted form when encryption is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactAssets {
    pub ca_cert: String,
    pub apiserver_cert: String,
    pub apiserver_key: String,
    pub worker_cert: String,
    pub worker_key: String,
    pub admin_cert: String,
    pub admin_key: String,
    pub etcd_cert: String,
    pub etcd_key: String,
    pub etcd_client_cert: String,
    pub etcd_client_key: String,
    pub dex_cert: String,
    pub dex_key: String,

    pub auth_tokens: String,
    pub tls_bootstrap_token: String,
}

impl CompactAssets {
    #[must_use]
    pub fn has_auth_tokens(&self) -> bool {
        !self.auth_tokens.is_empty()
    }

    #[must_use]
    pub fn has_tls_bootstrap_token(&self) -> bool {
        !self.tls_bootstrap_token.is_empty()
    }

    #[must_use]
    pub fn has_any_auth_tokens(&self) -> bool {
        self.has_auth_tokens() || self.has_tls_bootstrap_token()
    }
}
