use std::path::PathBuf;

use anyhow::{Context, Result};
use kube_assets::pki::inspect::load_certificates;

use crate::cli::args::CertificatesArgs;
use crate::cli::output::print_certificates;
use crate::commands::load_settings;

pub(crate) async fn run_show_certificates(
    config: Option<PathBuf>,
    args: &CertificatesArgs,
) -> Result<()> {
    let settings = load_settings(config, &args.assets)?;
    let dir = &settings.assets_dir;
    if !dir.is_dir() {
        anyhow::bail!(
            "assets directory {} not found; run `kube-assets render credentials` first",
            dir.display()
        );
    }
    let certificates = load_certificates(dir)
        .await
        .with_context(|| format!("Failed to load certificates from {}", dir.display()))?;
    if certificates.is_empty() {
        anyhow::bail!(
            "no certificates in {}; run `kube-assets render credentials` first",
            dir.display()
        );
    }
    print_certificates(&certificates);
    Ok(())
}
