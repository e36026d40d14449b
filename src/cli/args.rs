use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Cluster configuration file (defaults to ./cluster.toml when present)
    #[arg(long, env = "KUBE_ASSETS_CONFIG", global = true)]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    #[command(subcommand)]
    Render(RenderCommand),
    #[command(subcommand)]
    Show(ShowCommand),
}

#[derive(Subcommand, Debug)]
pub(crate) enum RenderCommand {
    /// Generate the CA, leaf certificates and tokens, then compact them
    Credentials(CredentialsArgs),
}

#[derive(Subcommand, Debug)]
pub(crate) enum ShowCommand {
    /// List the certificates in the assets directory
    Certificates(CertificatesArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct AssetsDirArgs {
    /// Assets directory (overrides `assets_dir` from the configuration)
    #[arg(long)]
    pub(crate) assets_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct CredentialsArgs {
    #[command(flatten)]
    pub(crate) assets: AssetsDirArgs,

    /// Generate a new CA; every leaf certificate is reissued
    #[arg(long, conflicts_with_all = ["ca_key_path", "ca_cert_path"])]
    pub(crate) generate_ca: bool,

    /// Existing CA private key (defaults to <assets-dir>/ca-key.pem)
    #[arg(long)]
    pub(crate) ca_key_path: Option<PathBuf>,

    /// Existing CA certificate (defaults to <assets-dir>/ca.pem)
    #[arg(long)]
    pub(crate) ca_cert_path: Option<PathBuf>,

    /// Reissue leaf certificates even when the existing ones are still valid
    #[arg(long)]
    pub(crate) force: bool,

    /// Write the compacted assets as JSON to this file
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct CertificatesArgs {
    #[command(flatten)]
    pub(crate) assets: AssetsDirArgs,
}
