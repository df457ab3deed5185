//! Information queries against hidden service units

use clap::Subcommand;
use tornet_fleet::FleetInspector;

/// Info subcommands
#[derive(Subcommand, Debug)]
pub enum InfoCommands {
    /// Print a working hidden service torrc, without comments
    Torrc,

    /// Print the onion address of a hidden service
    OnionDomain {
        /// Hidden service unit name; defaults to the first one
        name: Option<String>,
    },
}

/// Execute an info command
pub async fn execute(command: InfoCommands, inspector: &FleetInspector) -> anyhow::Result<()> {
    match command {
        InfoCommands::Torrc => {
            for line in inspector.hidden_service_torrc().await? {
                println!("{}", line);
            }
        }

        InfoCommands::OnionDomain { name } => {
            println!("{}", inspector.onion_domain(name.as_deref()).await?);
        }
    }
    Ok(())
}
