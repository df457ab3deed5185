//! Unit runtime implementations.
//!
//! This module provides the trait the fleet uses to drive a container
//! runtime and the Docker implementation of it.

mod docker;
#[cfg(test)]
pub(crate) mod memory;
mod r#trait;

pub use docker::{DockerRuntime, DockerRuntimeConfig, DockerRuntimeConfigBuilder};
pub use r#trait::{ExecOutput, PortBinding, SharedRuntime, UnitRuntime, UnitSpec, VolumeBinding};
