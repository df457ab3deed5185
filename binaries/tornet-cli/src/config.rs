//! Command-line configuration.
//!
//! This module provides configuration types for the `tornet` tool,
//! supporting loading from a TOML file, an environment variable naming that
//! file, and CLI argument overrides.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tornet_fleet::{
    AddressAllocator, AllocationPolicy, DockerRuntimeConfig, LifecycleConfig, ReadinessProbe,
};

/// Directory name under the platform config and data directories.
const APP_DIR: &str = "tornet";

/// Tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TornetConfig {
    /// Container runtime and unit settings.
    pub docker: DockerConfig,

    /// Registry document location.
    pub registry: RegistryConfig,

    /// Address allocation.
    pub allocation: AllocationConfig,

    /// Readiness probe for new directory authorities.
    pub readiness: ReadinessProbe,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Container runtime and unit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Prefix of generated unit names.
    pub name_prefix: String,

    /// Image every unit runs.
    pub image: String,

    /// Docker network units join.
    pub network: String,

    /// Shared volume mounted into every unit.
    pub volume: String,

    /// Mount point of the shared volume.
    pub volume_target: String,

    /// Client SOCKS port inside the unit.
    pub socks_port: u16,

    /// Seconds Docker waits for a unit to stop.
    pub stop_timeout_secs: i64,

    /// Command run inside a directory authority before removal.
    pub da_cleanup_command: Vec<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        let lifecycle = LifecycleConfig::default();
        Self {
            name_prefix: lifecycle.name_prefix,
            image: lifecycle.image,
            network: lifecycle.network,
            volume: lifecycle.volume,
            volume_target: lifecycle.volume_target,
            socks_port: lifecycle.socks_port,
            stop_timeout_secs: DockerRuntimeConfig::default().stop_timeout_secs,
            da_cleanup_command: lifecycle.da_cleanup_command,
        }
    }
}

/// Registry document location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path of the JSON document. Defaults to `<data dir>/tornet/status.json`.
    pub path: Option<PathBuf>,
}

impl RegistryConfig {
    /// Returns the configured path or the platform default.
    pub fn document_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().context("Could not determine the user data directory")?;
        Ok(data_dir.join(APP_DIR).join("status.json"))
    }
}

/// Address allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// `subnet` draws from the Docker network's subnet; `octet` from a
    /// fixed prefix.
    pub policy: String,

    /// Leading subnet addresses never handed out (`subnet` policy).
    pub reserved: u32,

    /// Fixed leading octets (`octet` policy).
    pub octet_prefix: [u8; 3],

    /// Lowest last octet (`octet` policy).
    pub octet_min: u8,

    /// Highest last octet (`octet` policy).
    pub octet_max: u8,

    /// Random draws before sweeping the range.
    pub max_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            policy: "subnet".to_string(),
            reserved: tornet_fleet::allocator::DEFAULT_RESERVED_ADDRESSES,
            octet_prefix: [10, 5, 0],
            octet_min: 10,
            octet_max: 250,
            max_attempts: tornet_fleet::allocator::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl AllocationConfig {
    /// Returns the allocation policy.
    pub fn policy(&self) -> anyhow::Result<AllocationPolicy> {
        match self.policy.to_lowercase().as_str() {
            "subnet" => Ok(AllocationPolicy::RandomInSubnet {
                reserved: self.reserved,
            }),
            "octet" => Ok(AllocationPolicy::RandomOctet {
                prefix: self.octet_prefix,
                min: self.octet_min,
                max: self.octet_max,
            }),
            other => bail!("Invalid allocation policy: {}", other),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl TornetConfig {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads the explicit file, else the default file if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path)
                .with_context(|| format!("Failed to load config from {:?}", path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)
                .with_context(|| format!("Failed to load config from {:?}", path)),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/tornet/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &super::CliArgs) {
        if let Some(ref path) = args.registry {
            self.registry.path = Some(path.clone());
        }

        if let Some(ref network) = args.network {
            self.docker.network = network.clone();
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.json_logs {
            self.logging.format = "json".to_string();
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            bail!("Invalid log format: {}", self.logging.format);
        }

        if self.docker.name_prefix.is_empty() {
            bail!("Unit name prefix must not be empty");
        }

        self.allocation.policy()?;
        if self.allocation.octet_min > self.allocation.octet_max {
            bail!(
                "Octet range is empty: {} > {}",
                self.allocation.octet_min,
                self.allocation.octet_max
            );
        }

        if self.readiness.is_enabled() {
            if self.readiness.interval_ms == 0 {
                bail!("Readiness probe interval must be positive");
            }
            if self.readiness.timeout_secs == 0 {
                bail!("Readiness probe timeout must be positive");
            }
        }

        Ok(())
    }

    /// Returns the lifecycle settings.
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            name_prefix: self.docker.name_prefix.clone(),
            image: self.docker.image.clone(),
            network: self.docker.network.clone(),
            volume: self.docker.volume.clone(),
            volume_target: self.docker.volume_target.clone(),
            socks_port: self.docker.socks_port,
            da_cleanup_command: self.docker.da_cleanup_command.clone(),
            readiness: self.readiness.clone(),
        }
    }

    /// Returns the Docker runtime settings.
    pub fn runtime_config(&self) -> DockerRuntimeConfig {
        DockerRuntimeConfig::builder()
            .stop_timeout_secs(self.docker.stop_timeout_secs)
            .build()
    }

    /// Returns the address allocator.
    pub fn allocator(&self) -> anyhow::Result<AddressAllocator> {
        Ok(AddressAllocator::new(self.allocation.policy()?)
            .with_max_attempts(self.allocation.max_attempts))
    }
}
