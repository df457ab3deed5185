//! tornet - manage a private Tor testbed.
//!
//! Provisions, tracks and tears down the containers that make up a small
//! private Tor network: directory authorities, relays, exit relays, clients
//! and hidden services. Unit identities and statuses persist in a registry
//! document between invocations.
//!
//! # Usage
//!
//! ```bash
//! # Bootstrap a network
//! tornet add da --count 3
//! tornet add relay --count 5
//! tornet add exit
//! tornet add client --port 9050
//! tornet add hs --hs-port 80 --service-port 8080
//!
//! # Inspect it
//! tornet list --filter RELAY --output table
//! tornet info onion-domain
//!
//! # Tear it down
//! tornet network delete
//! ```

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::TornetConfig;
use std::path::PathBuf;
use tornet_fleet::{FleetError, FleetInspector};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::add::AddCommands;
use commands::info::InfoCommands;
use commands::network::NetworkCommands;
use commands::unit::UnitCommands;
use output::{print_error, OutputFormat};

/// CLI arguments for tornet.
#[derive(Parser, Debug)]
#[command(
    name = "tornet",
    about = "Provision and manage a private Tor testbed",
    version
)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE", env = "TORNET_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Path to the registry document.
    #[arg(long, value_name = "FILE", global = true)]
    registry: Option<PathBuf>,

    /// Docker network the units join.
    #[arg(long, value_name = "NAME", global = true)]
    network: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add units to the network
    #[command(subcommand)]
    Add(AddCommands),

    /// Stop, start or delete a single unit
    #[command(subcommand)]
    Unit(UnitCommands),

    /// Print the registry
    List {
        /// Only print units whose JSON form contains this string
        #[arg(short, long)]
        filter: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Start, stop, restart or delete the whole network
    #[command(subcommand)]
    Network(NetworkCommands),

    /// Read information out of hidden service units
    #[command(subcommand)]
    Info(InfoCommands),

    /// Print the effective configuration and exit
    PrintConfig,
}

/// Initialize tracing.
fn init_tracing(config: &config::LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to parse log filter")?;

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}

async fn run(command: Commands, config: &TornetConfig) -> Result<()> {
    match command {
        Commands::PrintConfig => {
            println!("{}", toml::to_string_pretty(config)?);
        }

        Commands::List { filter, output } => {
            let registry = commands::open_registry(config)?;
            commands::list::execute(&registry, filter.as_deref(), output)?;
        }

        Commands::Add(command) => {
            let fleet = commands::connect(config).await?;
            commands::add::execute(command, &fleet).await?;
        }

        Commands::Unit(command) => {
            commands::unit::execute(command, config).await?;
        }

        Commands::Network(command) => {
            let fleet = commands::connect(config).await?;
            commands::network::execute(command, &fleet).await?;
        }

        Commands::Info(command) => {
            let fleet = commands::connect(config).await?;
            commands::info::execute(command, &FleetInspector::from_lifecycle(&fleet)).await?;
        }
    }
    Ok(())
}

/// Returns true if the error chain holds a fleet not-found error.
fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<FleetError>()
        .is_some_and(FleetError::is_not_found)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Load configuration
    let mut config = TornetConfig::load(args.config.as_deref())?;

    // Merge CLI arguments
    config.merge_cli_args(&args);

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    init_tracing(&config.logging)?;

    debug!(version = env!("CARGO_PKG_VERSION"), "tornet starting");

    if let Err(e) = run(args.command, &config).await {
        if is_not_found(&e) {
            print_error(&e.to_string());
            std::process::exit(1);
        }
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::parse_from(["tornet", "list"]);
        assert!(args.registry.is_none());
        assert!(!args.json_logs);
        assert!(matches!(
            args.command,
            Commands::List {
                filter: None,
                output: OutputFormat::Json
            }
        ));
    }

    #[test]
    fn test_cli_args_with_options() {
        let args = CliArgs::parse_from([
            "tornet",
            "list",
            "--filter",
            "RELAY",
            "--output",
            "table",
            "--log-level",
            "debug",
        ]);

        assert_eq!(args.log_level, Some("debug".to_string()));
        match args.command {
            Commands::List { filter, output } => {
                assert_eq!(filter.as_deref(), Some("RELAY"));
                assert_eq!(output, OutputFormat::Table);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_nested_subcommands() {
        let args = CliArgs::parse_from(["tornet", "unit", "delete", "testing-tor-da-abcdefgh"]);
        assert!(matches!(
            args.command,
            Commands::Unit(UnitCommands::Delete { ref name, no_restart: false })
                if name == "testing-tor-da-abcdefgh"
        ));

        let args = CliArgs::parse_from(["tornet", "info", "onion-domain"]);
        assert!(matches!(
            args.command,
            Commands::Info(InfoCommands::OnionDomain { name: None })
        ));

        let args = CliArgs::parse_from(["tornet", "network", "restart"]);
        assert!(matches!(args.command, Commands::Network(NetworkCommands::Restart)));

        assert!(CliArgs::try_parse_from(["tornet", "add", "bridge"]).is_err());
    }

    #[test]
    fn test_not_found_detection() {
        let err = anyhow::Error::from(FleetError::entry_not_found("x")).context("lookup");
        assert!(is_not_found(&err));

        let err = anyhow::Error::from(FleetError::NoHiddenService);
        assert!(is_not_found(&err));

        let err = anyhow::Error::from(FleetError::timeout("ready"));
        assert!(!is_not_found(&err));
    }
}
