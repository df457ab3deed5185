//! Single-unit commands

use clap::Subcommand;
use colored::*;
use tornet_fleet::CleanupStatus;

use crate::config::TornetConfig;
use crate::output::{print_info, print_success, print_warning};

/// Unit subcommands
#[derive(Subcommand, Debug)]
pub enum UnitCommands {
    /// Stop (but not remove) a unit
    Stop {
        /// Unit name
        name: String,
    },

    /// Start a stopped unit
    Start {
        /// Unit name
        name: String,
    },

    /// Remove a unit from the network and delete it
    Delete {
        /// Unit name
        name: String,

        /// Skip the network restart normally required after removing a
        /// directory authority
        #[arg(long)]
        no_restart: bool,
    },
}

impl UnitCommands {
    /// Name of the unit the command targets.
    pub fn name(&self) -> &str {
        match self {
            Self::Stop { name } | Self::Start { name } | Self::Delete { name, .. } => name,
        }
    }
}

/// Execute a unit command
///
/// The name is resolved against the registry before Docker is contacted.
pub async fn execute(command: UnitCommands, config: &TornetConfig) -> anyhow::Result<()> {
    let entry = super::open_registry(config)?.find(command.name())?;
    let fleet = super::connect(config).await?;

    match command {
        UnitCommands::Stop { name } => {
            print_info(&format!("Stopping unit {}...", name));
            fleet.stop(&entry).await?;
            print_success(&format!("Stopped unit {}", name.bold()));
        }

        UnitCommands::Start { name } => {
            print_info(&format!("Starting unit {}...", name));
            fleet.start(&entry).await?;
            print_success(&format!("Started unit {}", name.bold()));
        }

        UnitCommands::Delete { name, no_restart } => {
            print_info(&format!("Removing unit {}...", name));
            let outcome = fleet.remove(&entry, !no_restart).await?;

            match outcome.cleanup {
                Some(CleanupStatus::Failed { exit_code, output }) => print_warning(&format!(
                    "Cleanup exited {}: {}",
                    exit_code,
                    output.trim()
                )),
                Some(CleanupStatus::Errored(reason)) => {
                    print_warning(&format!("Cleanup could not run: {}", reason))
                }
                _ => {}
            }

            print_success(&format!("Removed unit {}", name.bold()));
            if let Some(restart) = outcome.restart {
                print_success(&format!(
                    "Restarted network ({} stopped, {} started)",
                    restart.stopped, restart.started
                ));
            }
        }
    }
    Ok(())
}
