use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use crate::cli::args::{Cli, CliCommand, RenderCommand, ShowCommand};

fn main() {
    if let Err(err) = run() {
        eprintln!("kube-assets error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        CliCommand::Render(RenderCommand::Credentials(args)) => {
            let runtime = tokio::runtime::Runtime::new()
                .context("Failed to initialize async runtime for render credentials")?;
            runtime.block_on(commands::render::run_render_credentials(cli.config, &args))?;
        }
        CliCommand::Show(ShowCommand::Certificates(args)) => {
            let runtime = tokio::runtime::Runtime::new()
                .context("Failed to initialize async runtime for show certificates")?;
            runtime.block_on(commands::show::run_show_certificates(cli.config, &args))?;
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
