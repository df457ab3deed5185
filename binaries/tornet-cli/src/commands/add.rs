//! Unit provisioning commands

use clap::{Args, Subcommand};
use colored::*;
use tornet_fleet::{CreateOptions, HiddenServiceOptions, LifecycleManager, Role};

use crate::output::{print_info, print_success};

/// Number of units to add
#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountArgs {
    /// How many units to add
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub count: u16,
}

/// Add subcommands
#[derive(Subcommand, Debug)]
pub enum AddCommands {
    /// Add directory authorities; the whole network restarts afterwards
    Da {
        #[command(flatten)]
        count: CountArgs,
    },

    /// Add middle/guard relays
    Relay {
        #[command(flatten)]
        count: CountArgs,
    },

    /// Add exit relays
    Exit {
        #[command(flatten)]
        count: CountArgs,
    },

    /// Add clients, usable as an entrypoint into the network
    Client {
        #[command(flatten)]
        count: CountArgs,

        /// SOCKSv5 port to expose on the host (single client only)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Add hidden services forwarding onion traffic to a backend
    Hs {
        #[command(flatten)]
        count: CountArgs,

        /// Port the onion service listens on
        #[arg(long, default_value_t = 80)]
        hs_port: u16,

        /// Address of the backend service
        #[arg(long, default_value = "127.0.0.1")]
        service_ip: String,

        /// Port of the backend service
        #[arg(long, default_value_t = 80)]
        service_port: u16,
    },
}

impl AddCommands {
    /// Returns the role, count and creation options.
    pub fn plan(&self) -> anyhow::Result<(Role, usize, CreateOptions)> {
        let (role, count, options) = match self {
            Self::Da { count } => (Role::DirectoryAuthority, count, CreateOptions::new()),
            Self::Relay { count } => (Role::Relay, count, CreateOptions::new()),
            Self::Exit { count } => (Role::Exit, count, CreateOptions::new()),
            Self::Client { count, port } => {
                if port.is_some() && count.count > 1 {
                    anyhow::bail!("--port can only be used when adding a single client");
                }
                let options = match port {
                    Some(port) => CreateOptions::new().exposed_port(*port),
                    None => CreateOptions::new(),
                };
                (Role::Client, count, options)
            }
            Self::Hs {
                count,
                hs_port,
                service_ip,
                service_port,
            } => {
                let hs = HiddenServiceOptions {
                    hs_port: *hs_port,
                    service_ip: service_ip.clone(),
                    service_port: *service_port,
                };
                (
                    Role::HiddenService,
                    count,
                    CreateOptions::new().hidden_service(&hs),
                )
            }
        };
        Ok((role, usize::from(count.count), options))
    }
}

/// Execute an add command
pub async fn execute(command: AddCommands, fleet: &LifecycleManager) -> anyhow::Result<()> {
    let (role, count, options) = command.plan()?;

    print_info(&format!("Adding {} {} unit(s)...", count, role.description()));
    if fleet.restart_policy().requires_restart(role) {
        print_info("Adding this role requires restarting all units afterwards");
    }

    let outcome = fleet.add(role, count, &options).await?;

    for entry in &outcome.created {
        print_success(&format!(
            "Added {} unit {} at {}",
            role.description(),
            entry.name.bold(),
            entry.address
        ));
    }
    if let Some(restart) = outcome.restart {
        print_success(&format!(
            "Restarted network ({} stopped, {} started)",
            restart.stopped, restart.started
        ));
    }
    Ok(())
}
