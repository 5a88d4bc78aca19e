//! dbsalvage - salvage table data from an unreliable database
//!
//! Usage:
//!   dbsalvage export  --database /data/legacy.db --tables "CUSTOMERS;ORDERS"
//!   dbsalvage tables  --config salvage.toml
//!   dbsalvage probe ORDERS --config salvage.toml

mod args;
mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use dbsalvage_extract::ExtractConfig;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli
        .log_dir
        .clone()
        .map(|dir| dir.unwrap_or_else(logging::log_directory));
    let _log_guard = logging::init(&logging::LoggingConfig::from_verbosity(
        cli.verbose,
        log_dir,
    ))?;

    let mut config = match &cli.config {
        Some(path) => ExtractConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ExtractConfig::default(),
    };
    cli.overrides.apply(&mut config);

    match cli.command {
        Commands::Export => commands::export(&config).await,
        Commands::Tables => commands::tables(&config).await,
        Commands::Probe { table } => commands::probe_table(&config, &table).await,
    }
}
