use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use libris_kernel::settings::{LoadOptions, Settings};

/// Library book inventory service
#[derive(Debug, Parser)]
#[command(name = "libris", version, about)]
struct Cli {
    /// Environment overlay to load (local, staging, production)
    #[arg(long, global = true)]
    env: Option<String>,

    /// Directory holding base.toml and <env>.toml
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command;

    let settings = Settings::load_with(LoadOptions {
        environment: cli.env,
        config_dir: cli.config_dir,
    })
    .with_context(|| "failed to load libris settings")?;
    libris_telemetry::init(&settings.telemetry)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(async move {
        match command {
            Command::Serve => libris_app::run(settings).await,
            Command::Migrate => {
                let applied = libris_app::migrate(settings).await?;
                tracing::info!(applied, "migrations complete");
                Ok(())
            }
        }
    })
}
