use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kube_assets::assets::CachedEncryptor;
use kube_assets::compact::CompactAssets;
use kube_assets::config::Settings;
use kube_assets::encrypt::KmsEncryptService;
use kube_assets::fs_util::write_credential_file;
use kube_assets::render::{
    CredentialsOptions, read_or_create_compact_assets, read_or_create_unencrypted_compact_assets,
    render_credentials,
};
use tracing::info;

use crate::cli::args::CredentialsArgs;
use crate::cli::output::print_render_summary;
use crate::commands::load_settings;

pub(crate) async fn run_render_credentials(
    config: Option<PathBuf>,
    args: &CredentialsArgs,
) -> Result<()> {
    let settings = load_settings(config, &args.assets)?;
    let options = CredentialsOptions {
        generate_ca: args.generate_ca,
        ca_key_path: args.ca_key_path.clone(),
        ca_cert_path: args.ca_cert_path.clone(),
        force: args.force,
    };

    let summary = render_credentials(&settings, &options)
        .await
        .context("Failed to render credentials")?;
    let compact = compact_assets(&settings).await?;

    if let Some(output) = &args.output {
        write_compact_assets(output, &compact).await?;
    }
    print_render_summary(
        &summary,
        settings.kms_config().as_ref().map(|kms| kms.key_arn.as_str()),
        args.output.as_deref(),
    );
    Ok(())
}

async fn compact_assets(settings: &Settings) -> Result<CompactAssets> {
    let dir = settings.assets_dir.as_path();
    let include_dex = settings.dex.enabled;
    match settings.kms_config() {
        Some(kms) => {
            info!("Encrypting keys and tokens with KMS key {}", kms.key_arn);
            let encryptor = CachedEncryptor::new(KmsEncryptService::new(&kms).await);
            read_or_create_compact_assets(dir, settings.manage_certificates, include_dex, &encryptor)
                .await
                .context("Failed to read/create encrypted assets")
        }
        None => read_or_create_unencrypted_compact_assets(
            dir,
            settings.manage_certificates,
            include_dex,
        )
        .await
        .context("Failed to read/create raw assets"),
    }
}

async fn write_compact_assets(path: &Path, compact: &CompactAssets) -> Result<()> {
    let json = serde_json::to_vec_pretty(compact).context("Failed to serialize compact assets")?;
    write_credential_file(path, &json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
