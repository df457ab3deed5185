//! Unit lifecycle management.
//!
//! The [`LifecycleManager`] drives the runtime and keeps the registry in step
//! with every transition. Each transition calls the runtime first and records
//! the result second; nothing is rolled back if a later step fails.
//!
//! ```text
//!            create            stop
//!   (none) ─────────▶ Running ──────▶ Stopped
//!                        ▲    ◀──────    │
//!                        │     start     │
//!                        └──── remove ───┴──▶ (removed)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::allocator::AddressAllocator;
use crate::error::{FleetError, Result};
use crate::registry::Registry;
use crate::runtime::{SharedRuntime, UnitSpec};
use crate::topology::{RestartSummary, TopologyRestartPolicy};
use crate::unit::{Role, UnitEntry, UnitIdentity, UnitStatus};

/// Default prefix of unit names; also the default image, network and volume name.
pub const DEFAULT_NAME_PREFIX: &str = "testing-tor";

/// SOCKS port a client unit listens on.
pub const DEFAULT_SOCKS_PORT: u16 = 9050;

const IDENTITY_ATTEMPTS: usize = 16;

/// Polls a unit until a command inside it succeeds.
///
/// Replaces a fixed pause after creating a directory authority: the unit
/// generates its key material asynchronously and the fleet restart must not
/// begin before the certificate exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessProbe {
    /// Command run inside the unit. An empty command disables the probe.
    pub command: Vec<String>,

    /// Give up after this many seconds.
    pub timeout_secs: u64,

    /// Pause between attempts, in milliseconds.
    pub interval_ms: u64,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            command: ["test", "-s", "/var/lib/tor/keys/authority_certificate"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_secs: 60,
            interval_ms: 1000,
        }
    }
}

impl ReadinessProbe {
    /// Returns the overall timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the pause between attempts.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns true if the probe has a command to run.
    pub fn is_enabled(&self) -> bool {
        !self.command.is_empty()
    }
}

/// Settings shared by every unit the manager creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Prefix of generated unit names.
    pub name_prefix: String,

    /// Image every unit runs.
    pub image: String,

    /// Runtime network units join.
    pub network: String,

    /// Shared volume mounted into every unit.
    pub volume: String,

    /// Mount point of the shared volume.
    pub volume_target: String,

    /// Unit port a client's exposed host port maps to.
    pub socks_port: u16,

    /// Command run inside a directory authority before it is removed.
    pub da_cleanup_command: Vec<String>,

    /// Readiness check for newly created directory authorities.
    pub readiness: ReadinessProbe,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            image: DEFAULT_NAME_PREFIX.to_string(),
            network: DEFAULT_NAME_PREFIX.to_string(),
            volume: DEFAULT_NAME_PREFIX.to_string(),
            volume_target: "/status".to_string(),
            socks_port: DEFAULT_SOCKS_PORT,
            da_cleanup_command: vec!["/opt/cleanup_da.sh".to_string()],
            readiness: ReadinessProbe::default(),
        }
    }
}

/// Per-unit options for [`LifecycleManager::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Host port bound to the unit's SOCKS port.
    pub exposed_port: Option<u16>,

    /// Extra environment on top of `ROLE` and `NICK`.
    pub env: BTreeMap<String, String>,
}

impl CreateOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a host port to the unit's SOCKS port.
    pub fn exposed_port(mut self, port: u16) -> Self {
        self.exposed_port = Some(port);
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds the hidden service variables.
    pub fn hidden_service(mut self, hs: &HiddenServiceOptions) -> Self {
        self.env.extend(hs.env());
        self
    }
}

/// Where a hidden service unit forwards onion traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenServiceOptions {
    /// Virtual port of the onion service.
    pub hs_port: u16,

    /// Backend address traffic is forwarded to.
    pub service_ip: String,

    /// Backend port traffic is forwarded to.
    pub service_port: u16,
}

impl Default for HiddenServiceOptions {
    fn default() -> Self {
        Self {
            hs_port: 80,
            service_ip: "127.0.0.1".to_string(),
            service_port: 80,
        }
    }
}

impl HiddenServiceOptions {
    /// Returns the `HS_PORT`, `SERVICE_IP` and `SERVICE_PORT` variables.
    pub fn env(&self) -> BTreeMap<String, String> {
        [
            ("HS_PORT".to_string(), self.hs_port.to_string()),
            ("SERVICE_IP".to_string(), self.service_ip.clone()),
            ("SERVICE_PORT".to_string(), self.service_port.to_string()),
        ]
        .into_iter()
        .collect()
    }
}

/// Result of the cleanup command run before removing a directory authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    /// The command exited zero.
    Succeeded,

    /// The command ran and exited non-zero.
    Failed {
        /// Exit code.
        exit_code: i32,
        /// Combined output.
        output: String,
    },

    /// The command could not be run.
    Errored(String),
}

impl CleanupStatus {
    /// Returns true if cleanup succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// What [`LifecycleManager::remove`] did.
#[derive(Debug, Clone)]
pub struct RemovalOutcome {
    /// The removed entry.
    pub entry: UnitEntry,

    /// Cleanup result, for directory authorities only.
    pub cleanup: Option<CleanupStatus>,

    /// Fleet restart triggered by the removal, if any.
    pub restart: Option<RestartSummary>,
}

/// What [`LifecycleManager::add`] did.
#[derive(Debug, Clone)]
pub struct AddOutcome {
    /// Entries created, in creation order.
    pub created: Vec<UnitEntry>,

    /// Fleet restart triggered by the additions, if any.
    pub restart: Option<RestartSummary>,
}

/// Creates, starts, stops and removes units and records every transition.
pub struct LifecycleManager {
    runtime: SharedRuntime,
    registry: Registry,
    allocator: AddressAllocator,
    restart_policy: TopologyRestartPolicy,
    config: LifecycleConfig,
}

impl LifecycleManager {
    /// Creates a manager with the default allocator and restart policy.
    pub fn new(runtime: SharedRuntime, registry: Registry, config: LifecycleConfig) -> Self {
        Self {
            runtime,
            registry,
            allocator: AddressAllocator::default(),
            restart_policy: TopologyRestartPolicy::default(),
            config,
        }
    }

    /// Replaces the address allocator.
    pub fn with_allocator(mut self, allocator: AddressAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Replaces the restart policy.
    pub fn with_restart_policy(mut self, policy: TopologyRestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the runtime.
    pub fn runtime(&self) -> &SharedRuntime {
        &self.runtime
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Returns the restart policy.
    pub fn restart_policy(&self) -> &TopologyRestartPolicy {
        &self.restart_policy
    }

    /// Creates and starts one unit and records it as running.
    ///
    /// Does not restart the fleet; see [`add`](Self::add).
    pub async fn create(&self, role: Role, options: &CreateOptions) -> Result<UnitEntry> {
        let used = self.registry.addresses_in_use()?;
        let subnet = if self.allocator.policy().needs_subnet() {
            Some(self.runtime.subnet(&self.config.network).await?)
        } else {
            None
        };
        let range = self.allocator.policy().range(subnet.as_ref())?;
        let address = self.allocator.allocate(&range, &used)?;
        let identity = self.unique_identity(role)?;

        info!(role = %role, unit = %identity.name, address = %address, "Creating unit");

        let spec = self.unit_spec(role, &identity, address, options);
        let runtime_id = self.runtime.create(&spec).await?;
        if let Err(e) = self.runtime.start(&runtime_id).await {
            warn!(unit = %identity.name, error = %e, "Unit did not start, removing it");
            self.discard(&identity.name, &runtime_id).await;
            return Err(e);
        }
        let entry = UnitEntry::new(role, identity.name, runtime_id, address);

        if let Err(e) = self.registry.append(entry.clone()) {
            warn!(unit = %entry.name, error = %e, "Could not record unit, removing it");
            self.discard(&entry.name, &entry.runtime_id).await;
            return Err(e);
        }

        Ok(entry)
    }

    /// Stops and removes a unit that never made it into the registry.
    async fn discard(&self, name: &str, runtime_id: &str) {
        if let Err(e) = self.runtime.stop(runtime_id).await {
            debug!(unit = %name, error = %e, "Unrecorded unit did not stop");
        }
        if let Err(e) = self.runtime.remove(runtime_id).await {
            warn!(unit = %name, error = %e, "Failed to remove unrecorded unit");
        }
    }

    /// Creates `count` units of one role, then restarts the fleet once if the
    /// role's membership is baked into other units' configuration.
    ///
    /// Each new directory authority must pass the readiness probe before the
    /// next step runs.
    pub async fn add(&self, role: Role, count: usize, options: &CreateOptions) -> Result<AddOutcome> {
        if count == 0 {
            return Err(FleetError::validation("unit count must be at least 1"));
        }
        if options.exposed_port.is_some() && count > 1 {
            return Err(FleetError::validation(
                "an exposed port can only be bound for a single unit",
            ));
        }

        let needs_restart = self.restart_policy.requires_restart(role);
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = self.create(role, options).await?;
            if needs_restart {
                self.wait_until_ready(&entry).await?;
            }
            created.push(entry);
        }

        let restart = if needs_restart {
            Some(self.restart_policy.on_da_membership_change(self).await?)
        } else {
            None
        };

        Ok(AddOutcome { created, restart })
    }

    /// Stops a unit and records it as stopped.
    ///
    /// A runtime failure is logged and ignored; the unit may already be stopped.
    pub async fn stop(&self, entry: &UnitEntry) -> Result<UnitEntry> {
        info!(unit = %entry.name, "Stopping unit");
        if let Err(e) = self.runtime.stop(&entry.runtime_id).await {
            warn!(unit = %entry.name, error = %e, "Unit did not stop, assuming already stopped");
        }
        self.registry
            .update(&entry.name, |e| e.status = UnitStatus::Stopped)
    }

    /// Starts a unit and records it as running.
    pub async fn start(&self, entry: &UnitEntry) -> Result<UnitEntry> {
        info!(unit = %entry.name, "Starting unit");
        self.runtime.start(&entry.runtime_id).await?;
        self.registry
            .update(&entry.name, |e| e.status = UnitStatus::Running)
    }

    /// Stops every recorded unit, in registry order.
    pub async fn stop_all(&self) -> Result<Vec<UnitEntry>> {
        let mut stopped = Vec::new();
        for entry in self.registry.list()? {
            stopped.push(self.stop(&entry).await?);
        }
        Ok(stopped)
    }

    /// Starts every recorded unit, in registry order.
    pub async fn start_all(&self) -> Result<Vec<UnitEntry>> {
        let mut started = Vec::new();
        for entry in self.registry.list()? {
            started.push(self.start(&entry).await?);
        }
        Ok(started)
    }

    /// Stops then starts every recorded unit.
    pub async fn restart_all(&self) -> Result<RestartSummary> {
        self.restart_policy.restart_fleet(self).await
    }

    /// Removes a unit from the runtime and the registry.
    ///
    /// A directory authority first runs its cleanup command; the result is
    /// reported but never aborts the removal. When `restart` is set and the
    /// role requires it, the rest of the fleet is restarted afterwards.
    pub async fn remove(&self, entry: &UnitEntry, restart: bool) -> Result<RemovalOutcome> {
        info!(unit = %entry.name, role = %entry.role, "Removing unit");

        let cleanup = if entry.role.is_directory_authority() {
            Some(self.run_cleanup(entry).await)
        } else {
            None
        };

        if let Err(e) = self.runtime.stop(&entry.runtime_id).await {
            warn!(unit = %entry.name, error = %e, "Unit did not stop, assuming already stopped");
        }
        self.runtime.remove(&entry.runtime_id).await?;
        self.registry.remove(&entry.name)?;

        let restart = if restart && self.restart_policy.requires_restart(entry.role) {
            Some(self.restart_policy.on_da_membership_change(self).await?)
        } else {
            None
        };

        Ok(RemovalOutcome {
            entry: entry.clone(),
            cleanup,
            restart,
        })
    }

    /// Removes every unit without restarts, resets the shared volume and
    /// deletes the registry document.
    pub async fn teardown(&self) -> Result<Vec<RemovalOutcome>> {
        let entries = self.registry.list()?;
        info!(units = entries.len(), "Tearing down fleet");

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in &entries {
            outcomes.push(self.remove(entry, false).await?);
        }

        self.runtime.reset_volume(&self.config.volume).await?;
        self.registry.destroy()?;
        Ok(outcomes)
    }

    /// Polls the readiness probe inside the unit until it succeeds.
    ///
    /// Fails with [`FleetError::Timeout`] once the probe's timeout elapses.
    pub async fn wait_until_ready(&self, entry: &UnitEntry) -> Result<()> {
        let probe = &self.config.readiness;
        if !probe.is_enabled() {
            return Ok(());
        }
        let cmd: Vec<&str> = probe.command.iter().map(String::as_str).collect();

        info!(unit = %entry.name, "Waiting for unit to become ready");

        let poll = async {
            loop {
                match self.runtime.exec(&entry.runtime_id, &cmd).await {
                    Ok(output) if output.success() => break,
                    Ok(output) => {
                        debug!(unit = %entry.name, exit_code = output.exit_code, "Not ready yet");
                    }
                    Err(e) => {
                        debug!(unit = %entry.name, error = %e, "Readiness probe failed");
                    }
                }
                tokio::time::sleep(probe.interval()).await;
            }
        };

        tokio::time::timeout(probe.timeout(), poll)
            .await
            .map_err(|_| FleetError::timeout(format!("unit {} to become ready", entry.name)))?;

        debug!(unit = %entry.name, "Unit is ready");
        Ok(())
    }

    async fn run_cleanup(&self, entry: &UnitEntry) -> CleanupStatus {
        let cmd: Vec<&str> = self
            .config
            .da_cleanup_command
            .iter()
            .map(String::as_str)
            .collect();
        if cmd.is_empty() {
            return CleanupStatus::Succeeded;
        }

        match self.runtime.exec(&entry.runtime_id, &cmd).await {
            Ok(output) if output.success() => {
                debug!(unit = %entry.name, "Cleanup succeeded");
                CleanupStatus::Succeeded
            }
            Ok(output) => {
                warn!(unit = %entry.name, exit_code = output.exit_code, "Cleanup command failed");
                CleanupStatus::Failed {
                    exit_code: output.exit_code,
                    output: output.combined_output(),
                }
            }
            Err(e) => {
                warn!(unit = %entry.name, error = %e, "Cleanup command could not run");
                CleanupStatus::Errored(e.to_string())
            }
        }
    }

    fn unique_identity(&self, role: Role) -> Result<UnitIdentity> {
        let names = self.registry.names_in_use()?;
        let mut rng = rand::thread_rng();
        (0..IDENTITY_ATTEMPTS)
            .map(|_| UnitIdentity::generate(&self.config.name_prefix, role, &mut rng))
            .find(|identity| !names.contains(&identity.name))
            .ok_or_else(|| FleetError::validation("could not generate a unique unit name"))
    }

    fn unit_spec(
        &self,
        role: Role,
        identity: &UnitIdentity,
        address: std::net::Ipv4Addr,
        options: &CreateOptions,
    ) -> UnitSpec {
        let mut spec = UnitSpec::new(
            &identity.name,
            &self.config.image,
            &self.config.network,
            address,
        )
        .envs(options.env.clone())
        .env("ROLE", role.token())
        .env("NICK", &identity.nickname)
        .volume(&self.config.volume, &self.config.volume_target);

        if let Some(port) = options.exposed_port {
            spec = spec.port(port, self.config.socks_port);
        }
        spec
    }
}
