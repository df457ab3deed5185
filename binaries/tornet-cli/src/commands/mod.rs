//! CLI command implementations

pub mod add;
pub mod info;
pub mod list;
pub mod network;
pub mod unit;

use anyhow::Context;
use std::sync::Arc;
use tornet_fleet::{DockerRuntime, LifecycleManager, Registry};

use crate::config::TornetConfig;

/// Opens the registry without touching the container runtime.
pub fn open_registry(config: &TornetConfig) -> anyhow::Result<Registry> {
    Ok(Registry::open(config.registry.document_path()?))
}

/// Connects to Docker and builds the lifecycle manager.
pub async fn connect(config: &TornetConfig) -> anyhow::Result<LifecycleManager> {
    let runtime = DockerRuntime::with_config(config.runtime_config())
        .await
        .context("Failed to connect to the Docker daemon")?;
    let registry = open_registry(config)?;

    Ok(
        LifecycleManager::new(Arc::new(runtime), registry, config.lifecycle_config())
            .with_allocator(config.allocator()?),
    )
}
