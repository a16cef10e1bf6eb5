//! CLI entry point for dio-aggregator
//!
//! Provides a command-line interface for:
//! - Checking aggregation requests without touching any line
//! - An operator console over simulated line controllers
//!
//! # Usage
//!
//! Check a request:
//! ```bash
//! dio-aggregator check "gpio0 1,3-4 gpio1 2"
//! ```
//!
//! Start the console with the chips and aggregators from a config file:
//! ```bash
//! dio-aggregator --config config/dio-aggregator.toml console
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dio_aggregator::config::{AppConfig, DEFAULT_CONFIG_PATH};
use dio_aggregator::logging::{self, LogFormat, LogSettings};
use dio_aggregator::parser::parse_request;
use dio_aggregator::{AggregatorRegistry, Console, Management};
use dio_driver_mock::MockLineProvider;
use tracing::info;

#[derive(Parser)]
#[command(name = "dio-aggregator")]
#[command(about = "Compose digital I/O lines into virtual multi-line devices", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Log source locations and span events
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a request and print the lines it names
    Check {
        /// Request text, e.g. "gpio0 1,3-4 reset"
        request: String,
    },

    /// Read commands from stdin against the configured mock chips
    Console,

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    config.validate().context("Invalid configuration")?;

    let settings = LogSettings::from_app_config(&config)?
        .format(cli.log_format)
        .verbose(cli.verbose);
    logging::init(&settings);

    match cli.command {
        Commands::Check { request } => check(&request),
        Commands::Console => run_console(&config),
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn check(request: &str) -> Result<()> {
    let selectors = parse_request(request).context("Request rejected")?;
    for (position, selector) in selectors.iter().enumerate() {
        println!("{}\t{}", position, selector);
    }
    Ok(())
}

fn run_console(config: &AppConfig) -> Result<()> {
    let provider = Arc::new(
        MockLineProvider::from_configs(config.chips.clone())
            .context("Failed to set up mock chips")?,
    );
    let registry = Arc::new(
        AggregatorRegistry::new(provider.clone())
            .with_prefix(config.registry.device_prefix.clone())
            .with_publisher(provider),
    );

    let created = config
        .create_aggregators(&registry)
        .context("Failed to create configured aggregators")?;
    for id in &created {
        println!("{}", registry.device_name(*id));
    }
    info!(
        name = %config.application.name,
        chips = config.chips.len(),
        aggregators = created.len(),
        "Console ready"
    );

    let console = Console::new(Management::new(registry.clone()));
    console
        .run(io::stdin().lock(), io::stdout().lock())
        .context("Console I/O failed")?;

    let drained = registry.drain();
    info!(drained, "Console closed");
    Ok(())
}
