//! `render credentials`: bring the assets directory up to date and compact it.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::assets::{
    AUTH_TOKENS_FILE, AssetsOnDisk, CA_CERT_FILE, CA_KEY_FILE, CachedEncryptor,
    TLS_BOOTSTRAP_TOKEN_FILE, encrypted_file_name, read_or_create_raw,
};
use crate::assets::bundle::DEFAULT_AUTH_TOKENS;
use crate::compact::CompactAssets;
use crate::config::Settings;
use crate::encrypt::EncryptService;
use crate::error::{CredentialError, Result};
use crate::fs_util::{ensure_assets_dir, read_if_exists, remove_if_exists, write_credential_file};
use crate::pki::inspect::stale_reason;
use crate::pki::{CertificateAuthority, LeafCertificateSpec, cluster_leaf_specs, issue_certificates};
use crate::token::new_random_token;

#[derive(Debug, Clone, Default)]
pub struct CredentialsOptions {
    /// Create a new CA, replacing any existing one.
    pub generate_ca: bool,
    pub ca_key_path: Option<PathBuf>,
    pub ca_cert_path: Option<PathBuf>,
    /// Reissue every leaf certificate even if the existing one is still valid.
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub assets_dir: PathBuf,
    pub ca_generated: bool,
    pub issued: Vec<String>,
    pub reused: Vec<String>,
}

/// Generates every missing or stale credential under `settings.assets_dir`.
///
/// Validation of the settings happens before anything touches the disk.
///
/// # Errors
/// Returns a validation error for bad settings or a missing CA, and a disk,
/// crypto or encryption error if generation fails part way.
pub async fn render_credentials(
    settings: &Settings,
    options: &CredentialsOptions,
) -> Result<RenderSummary> {
    settings.validate()?;
    let specs = if settings.manage_certificates {
        cluster_leaf_specs(settings)?
    } else {
        Vec::new()
    };
    if options.generate_ca && (options.ca_cert_path.is_some() || options.ca_key_path.is_some()) {
        return Err(CredentialError::validation(
            "CA options",
            "--generate-ca cannot be combined with --ca-cert-path or --ca-key-path",
        ));
    }

    let dir = settings.assets_dir.as_path();
    ensure_assets_dir(dir).await?;
    let mut summary = RenderSummary {
        assets_dir: dir.to_path_buf(),
        ..RenderSummary::default()
    };

    if settings.manage_certificates {
        let ca = if options.generate_ca {
            summary.ca_generated = true;
            generate_ca(settings, dir).await?
        } else {
            load_ca(dir, options).await?
        };
        let (issued, reused) = refresh_leaf_certificates(dir, &ca, &specs, options.force).await?;
        summary.issued = issued;
        summary.reused = reused;
    } else {
        info!("Certificates are managed externally; only tokens are rendered");
    }

    read_or_create_raw(dir, AUTH_TOKENS_FILE, Some(DEFAULT_AUTH_TOKENS)).await?;
    let bootstrap_token = new_random_token()?;
    read_or_create_raw(dir, TLS_BOOTSTRAP_TOKEN_FILE, Some(bootstrap_token.as_bytes())).await?;

    info!(
        "Rendered credentials in {} ({} issued, {} reused)",
        dir.display(),
        summary.issued.len(),
        summary.reused.len()
    );
    Ok(summary)
}

/// Reads the assets directory, encrypting keys and tokens, and compacts it.
///
/// # Errors
/// Returns an error if a credential is missing, cannot be encrypted or
/// cannot be compacted.
pub async fn read_or_create_compact_assets<E: EncryptService>(
    dir: &Path,
    manage_certificates: bool,
    include_dex: bool,
    encryptor: &CachedEncryptor<E>,
) -> Result<CompactAssets> {
    AssetsOnDisk::read_or_encrypt(dir, manage_certificates, include_dex, encryptor)
        .await?
        .compact()
}

/// Reads the assets directory as plaintext and compacts it.
///
/// # Errors
/// Returns an error if a credential is missing or cannot be compacted.
pub async fn read_or_create_unencrypted_compact_assets(
    dir: &Path,
    manage_certificates: bool,
    include_dex: bool,
) -> Result<CompactAssets> {
    AssetsOnDisk::read_raw(dir, manage_certificates, include_dex)
        .await?
        .compact()
}

async fn generate_ca(settings: &Settings, dir: &Path) -> Result<CertificateAuthority> {
    let ca = CertificateAuthority::generate(settings.tls.ca_duration_days, &settings.tls.organization)?;
    write_credential_file(&dir.join(CA_CERT_FILE), ca.cert_pem().as_bytes()).await?;
    write_credential_file(&dir.join(CA_KEY_FILE), ca.key_pem().as_bytes()).await?;
    warn!(
        "Generated a new CA in {}; certificates signed by any previous CA will be reissued",
        dir.display()
    );
    Ok(ca)
}

async fn load_ca(dir: &Path, options: &CredentialsOptions) -> Result<CertificateAuthority> {
    let cert_path = options
        .ca_cert_path
        .clone()
        .unwrap_or_else(|| dir.join(CA_CERT_FILE));
    let key_path = options
        .ca_key_path
        .clone()
        .unwrap_or_else(|| dir.join(CA_KEY_FILE));

    let cert_pem = read_ca_file(&cert_path).await?;
    let key_pem = read_ca_file(&key_path).await?;
    let ca = CertificateAuthority::from_pem(&cert_pem, &key_pem)?;
    debug!("Loaded CA from {}", cert_path.display());

    let assets_ca_path = dir.join(CA_CERT_FILE);
    let current = read_if_exists(&assets_ca_path).await?;
    if current.as_deref() != Some(ca.cert_pem().as_bytes()) {
        write_credential_file(&assets_ca_path, ca.cert_pem().as_bytes()).await?;
        info!("Copied CA certificate to {}", assets_ca_path.display());
    }

    let assets_key_path = dir.join(CA_KEY_FILE);
    if key_path != assets_key_path {
        drop_mismatched_ca_key(&ca, &assets_key_path).await?;
    }
    Ok(ca)
}

/// Removes a CA key left in the assets dir by an earlier `--generate-ca` run
/// once `ca.pem` there belongs to a different CA.
async fn drop_mismatched_ca_key(ca: &CertificateAuthority, path: &Path) -> Result<()> {
    let Some(existing) = read_if_exists(path).await? else {
        return Ok(());
    };
    let matches = String::from_utf8(existing)
        .ok()
        .is_some_and(|key_pem| CertificateAuthority::from_pem(ca.cert_pem(), &key_pem).is_ok());
    if !matches && remove_if_exists(path).await? {
        warn!(
            "Removed {} because it does not belong to the CA in use",
            path.display()
        );
    }
    Ok(())
}

async fn read_ca_file(path: &Path) -> Result<String> {
    let Some(bytes) = read_if_exists(path).await? else {
        return Err(CredentialError::validation(
            "CA",
            format!(
                "{} not found; pass --generate-ca to create a new CA, or point \
                 --ca-cert-path/--ca-key-path at an existing one",
                path.display()
            ),
        ));
    };
    String::from_utf8(bytes)
        .map_err(|_| CredentialError::validation("CA", format!("{} is not PEM", path.display())))
}

async fn refresh_leaf_certificates(
    dir: &Path,
    ca: &CertificateAuthority,
    specs: &[LeafCertificateSpec],
    force: bool,
) -> Result<(Vec<String>, Vec<String>)> {
    let mut stale = Vec::new();
    let mut reused = Vec::new();
    for spec in specs {
        if force {
            stale.push(spec.clone());
            continue;
        }
        let cert = read_if_exists(&dir.join(spec.cert_file_name())).await?;
        let key = read_if_exists(&dir.join(spec.key_file_name())).await?;
        let reason = match (cert, key) {
            (Some(cert), Some(key)) => stale_reason(ca, spec, &cert, &key),
            _ => Some("certificate or key is missing".to_string()),
        };
        match reason {
            None => {
                debug!("Keeping {} certificate", spec.name);
                reused.push(spec.name.clone());
            }
            Some(reason) => {
                info!("Reissuing {} certificate: {reason}", spec.name);
                stale.push(spec.clone());
            }
        }
    }

    let issued = issue_certificates(ca, &stale)?;
    for certificate in issued.values() {
        write_credential_file(&dir.join(certificate.cert.name()), certificate.cert.bytes()).await?;
        write_credential_file(&dir.join(certificate.key.name()), certificate.key.bytes()).await?;
        let cached = dir.join(encrypted_file_name(certificate.key.name()));
        if remove_if_exists(&cached).await? {
            debug!("Removed stale {}", cached.display());
        }
    }
    Ok((stale.into_iter().map(|spec| spec.name).collect(), reused))
}
