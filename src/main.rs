use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vatpac_tracker::commands;
use vatpac_tracker::config::Config;

#[derive(Parser)]
#[command(name = "vatpac-tracker", about = "Live air-traffic ingestion and tracking over Australian airspace")]
struct Cli {
    /// Path to a TOML config file. Falls back to built-in defaults plus
    /// environment variable overrides when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingest/lifecycle loop until Ctrl+C.
    Run,
    /// Validate the configured airspace reference files and exit.
    ReloadAirspace,
    /// Run pending Diesel migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run => commands::handle_run(config).await,
        Command::ReloadAirspace => commands::handle_reload_airspace(config).await,
        Command::Migrate => commands::handle_migrate(&config).await,
    }
}
