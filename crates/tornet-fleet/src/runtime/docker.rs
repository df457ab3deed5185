//! Docker runtime implementation.
//!
//! Talks to the local Docker daemon through bollard. Each unit is one
//! container attached to a user-defined network with a fixed IPv4 address.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{EndpointIpamConfig, EndpointSettings, HostConfig, PortBinding};
use bollard::network::InspectNetworkOptions;
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::Docker;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::allocator::Subnet;
use crate::error::{FleetError, Result};
use crate::runtime::r#trait::{ExecOutput, UnitRuntime, UnitSpec};

/// Configuration for the Docker runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerRuntimeConfig {
    /// Seconds the daemon waits for a unit to stop before killing it.
    pub stop_timeout_secs: i64,

    /// Whether removal kills a unit that is still running.
    pub force_remove: bool,

    /// Whether to verify the daemon connection on startup.
    pub ping_on_connect: bool,
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 10,
            force_remove: true,
            ping_on_connect: true,
        }
    }
}

impl DockerRuntimeConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> DockerRuntimeConfigBuilder {
        DockerRuntimeConfigBuilder::default()
    }
}

/// Builder for `DockerRuntimeConfig`.
#[derive(Debug, Default)]
pub struct DockerRuntimeConfigBuilder {
    config: DockerRuntimeConfig,
}

impl DockerRuntimeConfigBuilder {
    /// Sets the stop timeout.
    pub fn stop_timeout_secs(mut self, secs: i64) -> Self {
        self.config.stop_timeout_secs = secs;
        self
    }

    /// Sets whether removal is forced.
    pub fn force_remove(mut self, force: bool) -> Self {
        self.config.force_remove = force;
        self
    }

    /// Sets whether to ping the daemon on connect.
    pub fn ping_on_connect(mut self, ping: bool) -> Self {
        self.config.ping_on_connect = ping;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DockerRuntimeConfig {
        self.config
    }
}

/// Docker-backed unit runtime.
pub struct DockerRuntime {
    /// Docker client.
    docker: Docker,

    /// Runtime configuration.
    config: DockerRuntimeConfig,
}

impl DockerRuntime {
    /// Connects to the local daemon with default configuration.
    pub async fn new() -> Result<Self> {
        Self::with_config(DockerRuntimeConfig::default()).await
    }

    /// Connects to the local daemon with the given configuration.
    pub async fn with_config(config: DockerRuntimeConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;

        if config.ping_on_connect {
            docker.ping().await?;
        }

        info!("Connected to Docker daemon");

        Ok(Self { docker, config })
    }
}

fn is_status(err: &DockerError, code: u16) -> bool {
    matches!(err, DockerError::DockerResponseServerError { status_code, .. } if *status_code == code)
}

#[async_trait]
impl UnitRuntime for DockerRuntime {
    async fn create(&self, spec: &UnitSpec) -> Result<String> {
        let exposed_ports: Option<HashMap<String, HashMap<(), ()>>> = spec.port.map(|p| {
            [(format!("{}/tcp", p.unit_port), HashMap::new())]
                .into_iter()
                .collect()
        });

        let port_bindings: Option<HashMap<String, Option<Vec<PortBinding>>>> =
            spec.port.map(|p| {
                let binding = PortBinding {
                    host_ip: None,
                    host_port: Some(p.host_port.to_string()),
                };
                [(format!("{}/tcp", p.unit_port), Some(vec![binding]))]
                    .into_iter()
                    .collect()
            });

        let host_config = HostConfig {
            binds: Some(spec.volumes.iter().map(|v| v.to_bind()).collect()),
            port_bindings,
            network_mode: Some(spec.network.clone()),
            ..Default::default()
        };

        let endpoint = EndpointSettings {
            ipam_config: Some(EndpointIpamConfig {
                ipv4_address: Some(spec.address.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            hostname: Some(spec.name.clone()),
            env: Some(spec.env_list()),
            exposed_ports,
            host_config: Some(host_config),
            networking_config: Some(NetworkingConfig {
                endpoints_config: [(spec.network.clone(), endpoint)].into_iter().collect(),
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| FleetError::unit_creation_failed(&spec.name, e.to_string()))?;

        info!(
            container = %spec.name,
            id = %response.id,
            address = %spec.address,
            "Created container"
        );

        Ok(response.id)
    }

    async fn start(&self, runtime_id: &str) -> Result<()> {
        self.docker
            .start_container(runtime_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| FleetError::unit_start_failed(runtime_id, e.to_string()))?;
        debug!(container = %runtime_id, "Started container");
        Ok(())
    }

    async fn stop(&self, runtime_id: &str) -> Result<()> {
        let options = StopContainerOptions {
            t: self.config.stop_timeout_secs,
        };
        self.docker
            .stop_container(runtime_id, Some(options))
            .await
            .map_err(|e| {
                if is_status(&e, 304) {
                    FleetError::unit_stop_failed(runtime_id, "already stopped")
                } else {
                    FleetError::unit_stop_failed(runtime_id, e.to_string())
                }
            })?;
        debug!(container = %runtime_id, "Stopped container");
        Ok(())
    }

    async fn remove(&self, runtime_id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: self.config.force_remove,
            ..Default::default()
        };
        self.docker
            .remove_container(runtime_id, Some(options))
            .await
            .map_err(|e| FleetError::unit_removal_failed(runtime_id, e.to_string()))?;
        info!(container = %runtime_id, "Removed container");
        Ok(())
    }

    async fn exec(&self, runtime_id: &str, cmd: &[&str]) -> Result<ExecOutput> {
        debug!(container = %runtime_id, cmd = ?cmd, "Executing command");

        let exec_options = CreateExecOptions {
            cmd: Some(cmd.iter().map(|s| s.to_string()).collect()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(runtime_id, exec_options)
            .await
            .map_err(|e| FleetError::exec_failed(runtime_id, e.to_string()))?;

        let start_result = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(result) = output.next().await {
                match result {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(FleetError::exec_failed(runtime_id, e.to_string()));
                    }
                }
            }
        }

        let exec_inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = exec_inspect.exit_code.unwrap_or(-1) as i32;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn subnet(&self, network: &str) -> Result<Subnet> {
        let inspect = self
            .docker
            .inspect_network(network, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| {
                if is_status(&e, 404) {
                    FleetError::network_not_found(network)
                } else {
                    FleetError::DockerApi(e)
                }
            })?;

        let subnet = inspect
            .ipam
            .and_then(|ipam| ipam.config)
            .into_iter()
            .flatten()
            .filter_map(|config| config.subnet)
            .find(|subnet| !subnet.contains(':'))
            .ok_or_else(|| {
                FleetError::configuration(format!("network {network} has no IPv4 subnet"))
            })?;

        debug!(network = %network, subnet = %subnet, "Resolved network subnet");
        subnet.parse()
    }

    async fn reset_volume(&self, volume: &str) -> Result<()> {
        match self
            .docker
            .remove_volume(volume, Some(RemoveVolumeOptions { force: true }))
            .await
        {
            Ok(()) => info!(volume = %volume, "Removed volume"),
            Err(e) if is_status(&e, 404) => {
                warn!(volume = %volume, "Volume did not exist");
            }
            Err(e) => return Err(e.into()),
        }

        let options = CreateVolumeOptions {
            name: volume,
            ..Default::default()
        };
        self.docker.create_volume(options).await?;
        info!(volume = %volume, "Created volume");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = DockerRuntimeConfig::builder()
            .stop_timeout_secs(3)
            .force_remove(false)
            .ping_on_connect(false)
            .build();

        assert_eq!(config.stop_timeout_secs, 3);
        assert!(!config.force_remove);
        assert!(!config.ping_on_connect);
    }

    #[test]
    fn test_default_config() {
        let config = DockerRuntimeConfig::default();
        assert_eq!(config.stop_timeout_secs, 10);
        assert!(config.force_remove);
    }

    #[test]
    fn test_status_matching() {
        let err = DockerError::DockerResponseServerError {
            status_code: 404,
            message: "no such network".to_string(),
        };
        assert!(is_status(&err, 404));
        assert!(!is_status(&err, 304));
    }
}
