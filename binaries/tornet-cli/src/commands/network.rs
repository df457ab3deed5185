//! Fleet-wide commands

use clap::Subcommand;
use tornet_fleet::LifecycleManager;

use crate::output::{print_info, print_success, print_warning};

/// Network subcommands
#[derive(Subcommand, Debug)]
pub enum NetworkCommands {
    /// Start every recorded unit
    Start,

    /// Stop every recorded unit
    Stop,

    /// Stop every unit, then start them all again
    Restart,

    /// Delete every unit, empty the shared volume and drop the registry
    Delete,
}

/// Execute a network command
pub async fn execute(command: NetworkCommands, fleet: &LifecycleManager) -> anyhow::Result<()> {
    match command {
        NetworkCommands::Start => {
            print_info("Starting all units...");
            let started = fleet.start_all().await?;
            print_success(&format!("Started {} unit(s)", started.len()));
        }

        NetworkCommands::Stop => {
            print_info("Stopping all units...");
            let stopped = fleet.stop_all().await?;
            print_success(&format!("Stopped {} unit(s)", stopped.len()));
        }

        NetworkCommands::Restart => {
            print_info("Restarting all units...");
            let summary = fleet.restart_all().await?;
            print_success(&format!(
                "Restarted network ({} stopped, {} started)",
                summary.stopped, summary.started
            ));
        }

        NetworkCommands::Delete => {
            print_info("Removing all units and cleaning the shared volume...");
            let outcomes = fleet.teardown().await?;
            let failed_cleanups = outcomes
                .iter()
                .filter(|o| o.cleanup.as_ref().is_some_and(|c| !c.is_success()))
                .count();
            if failed_cleanups > 0 {
                print_warning(&format!(
                    "{} directory authority cleanup(s) failed",
                    failed_cleanups
                ));
            }
            print_success(&format!("Deleted {} unit(s)", outcomes.len()));
        }
    }
    Ok(())
}
