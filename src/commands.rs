pub(crate) mod render;
pub(crate) mod show;

use anyhow::{Context, Result};
use kube_assets::config::Settings;

use crate::cli::args::AssetsDirArgs;

/// Loads the cluster configuration and applies the `--assets-dir` override.
pub(crate) fn load_settings(
    config: Option<std::path::PathBuf>,
    assets: &AssetsDirArgs,
) -> Result<Settings> {
    let mut settings = Settings::new(config).context("Failed to load cluster configuration")?;
    if let Some(assets_dir) = &assets.assets_dir {
        assets_dir.clone_into(&mut settings.assets_dir);
    }
    Ok(settings)
}
