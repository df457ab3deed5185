//! Unit runtime trait definition.
//!
//! This module defines the seam between the fleet and the container runtime
//! that actually materializes units, along with the unit specification and
//! exec output types that cross it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::allocator::Subnet;
use crate::error::Result;

/// Container runtime that creates, starts, stops and removes units.
///
/// Units are addressed by the opaque handle returned from [`create`]. The
/// runtime keeps no fleet state of its own; the registry is the record of
/// which handles belong to the fleet.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a runtime can be shared behind
/// an [`Arc`] by the lifecycle manager and the information queries.
///
/// [`create`]: UnitRuntime::create
#[async_trait]
pub trait UnitRuntime: Send + Sync {
    /// Creates a unit from the specification without starting it.
    ///
    /// Returns the runtime handle of the new unit.
    async fn create(&self, spec: &UnitSpec) -> Result<String>;

    /// Starts a stopped unit.
    async fn start(&self, runtime_id: &str) -> Result<()>;

    /// Stops a running unit.
    ///
    /// May fail if the unit is already stopped; callers decide whether that
    /// matters.
    async fn stop(&self, runtime_id: &str) -> Result<()>;

    /// Removes a unit. The unit should already be stopped.
    async fn remove(&self, runtime_id: &str) -> Result<()>;

    /// Executes a command inside a running unit.
    ///
    /// A non-zero exit code is not an error; it is reported in [`ExecOutput`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// let output = runtime.exec(&entry.runtime_id, &["cat", "/etc/tor/torrc"]).await?;
    /// assert!(output.success());
    /// ```
    async fn exec(&self, runtime_id: &str, cmd: &[&str]) -> Result<ExecOutput>;

    /// Looks up the IPv4 subnet of a runtime network.
    async fn subnet(&self, network: &str) -> Result<Subnet>;

    /// Removes a named volume and creates it again empty.
    async fn reset_volume(&self, volume: &str) -> Result<()>;
}

/// A shared runtime for dynamic dispatch.
pub type SharedRuntime = Arc<dyn UnitRuntime>;

/// Everything the runtime needs to materialize one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Unit name, also used as the container name.
    pub name: String,

    /// Image reference.
    pub image: String,

    /// Environment variables.
    pub env: BTreeMap<String, String>,

    /// Runtime network the unit joins.
    pub network: String,

    /// Fixed address on that network.
    pub address: Ipv4Addr,

    /// Named volumes mounted into the unit.
    pub volumes: Vec<VolumeBinding>,

    /// Optional host port published to a unit port.
    pub port: Option<PortBinding>,
}

impl UnitSpec {
    /// Creates a specification with no environment, volumes or ports.
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        network: impl Into<String>,
        address: Ipv4Addr,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: BTreeMap::new(),
            network: network.into(),
            address,
            volumes: Vec::new(),
            port: None,
        }
    }

    /// Sets an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Mounts a named volume.
    pub fn volume(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.volumes.push(VolumeBinding {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    /// Publishes `host_port` on the host to `unit_port` inside the unit.
    pub fn port(mut self, host_port: u16, unit_port: u16) -> Self {
        self.port = Some(PortBinding {
            host_port,
            unit_port,
        });
        self
    }

    /// Returns the environment as `KEY=value` strings.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// A named volume mounted into a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBinding {
    /// Volume name.
    pub source: String,

    /// Mount point inside the unit.
    pub target: String,
}

impl VolumeBinding {
    /// Returns the bind in `source:target` form.
    pub fn to_bind(&self) -> String {
        format!("{}:{}", self.source, self.target)
    }
}

/// A host port published to a unit port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Port on the host.
    pub host_port: u16,

    /// Port inside the unit.
    pub unit_port: u16,
}

/// Output from executing a command in a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,

    /// Standard error from the command.
    pub stderr: String,

    /// Exit code of the command.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Creates a new exec output.
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined stdout and stderr.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}
