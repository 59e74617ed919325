//! Trip planner CLI (famtrip-planner) - Main entry point
//!
//! Runs one enrichment lookup through a planner assembled from the config
//! file (rate limits, timeouts, caching) and prints the result as JSON.
//! Useful for checking API keys and provider reachability.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use famtrip_common::config::{self, TomlConfig, CONFIG_ENV_VAR};
use famtrip_planner::{InMemoryStore, PlanningCoordinator};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for famtrip-planner
#[derive(Parser, Debug)]
#[command(name = "famtrip-planner")]
#[command(about = "Family trip planner enrichment tools")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve an address to coordinates
    Geocode {
        /// Free-form address, e.g. "Osaka Castle, Osaka, Japan"
        address: String,
    },

    /// Fetch current weather and a short forecast
    #[command(allow_negative_numbers = true)]
    Weather { latitude: f64, longitude: f64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config first: it supplies the fallback log level
    let toml_config = config::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&toml_config)?;

    info!("Starting famtrip-planner v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(InMemoryStore::new());
    let coordinator = PlanningCoordinator::from_config(store, &toml_config)
        .context("Failed to initialize enrichment providers")?;
    let cache = coordinator.enrichment();

    let output = match args.command {
        Command::Geocode { address } => {
            let lookup = cache.resolve_coordinates(&address).await;
            serde_json::to_string_pretty(&lookup)?
        }
        Command::Weather {
            latitude,
            longitude,
        } => {
            let lookup = cache.resolve_weather(latitude, longitude).await;
            serde_json::to_string_pretty(&lookup)?
        }
    };

    println!("{output}");
    info!(stats = ?cache.stats(), "Lookup complete");
    Ok(())
}

/// RUST_LOG wins; otherwise the `[logging] level` from the config file
fn init_tracing(toml_config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| toml_config.logging.level.as_str().into());

    match &toml_config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}
