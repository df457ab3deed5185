//! Fleet management for a private Tor testbed.
//!
//! This crate provisions, tracks and tears down the role-tagged containers
//! that together form a private Tor network: directory authorities, relays,
//! exit relays, clients and hidden services.
//!
//! # Overview
//!
//! The fleet handles:
//! - **Registry**: a JSON document recording every unit's name, runtime
//!   handle, role, status and overlay address
//! - **Address allocation**: picking a free overlay address for each new unit
//! - **Unit lifecycle**: create, start, stop and remove against a container
//!   runtime, recording every transition
//! - **Topology restarts**: restarting the whole fleet when directory
//!   authority membership changes
//!
//! # Architecture
//!
//! - [`registry`]: file-backed registry with locked read-modify-write cycles
//! - [`allocator`]: subnet parsing and bounded random address allocation
//! - [`runtime`]: the runtime trait and its Docker implementation
//! - [`lifecycle`]: the lifecycle manager
//! - [`topology`]: the restart policy
//! - [`inspect`]: reading torrc and onion names out of units
//! - [`unit`]: roles, statuses and registry entries
//! - [`error`]: error types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tornet_fleet::{
//!     CreateOptions, DockerRuntime, LifecycleConfig, LifecycleManager, Registry, Role,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Arc::new(DockerRuntime::new().await?);
//!     let registry = Registry::open("/var/lib/tornet/status.json");
//!     let fleet = LifecycleManager::new(runtime, registry, LifecycleConfig::default());
//!
//!     // Three authorities; the fleet restarts once after the batch
//!     fleet.add(Role::DirectoryAuthority, 3, &CreateOptions::new()).await?;
//!     fleet.add(Role::Relay, 5, &CreateOptions::new()).await?;
//!
//!     for entry in fleet.registry().list()? {
//!         println!("{} {} {}", entry.name, entry.role, entry.address);
//!     }
//!
//!     fleet.teardown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod allocator;
pub mod error;
pub mod inspect;
pub mod lifecycle;
pub mod registry;
pub mod runtime;
pub mod topology;
pub mod unit;

// Re-export commonly used types at the crate root
pub use allocator::{AddressAllocator, AddressRange, AllocationPolicy, Subnet};
pub use error::{FleetError, Result};
pub use inspect::FleetInspector;
pub use lifecycle::{
    AddOutcome, CleanupStatus, CreateOptions, HiddenServiceOptions, LifecycleConfig,
    LifecycleManager, ReadinessProbe, RemovalOutcome,
};
pub use registry::Registry;
pub use runtime::{DockerRuntime, DockerRuntimeConfig, ExecOutput, SharedRuntime, UnitRuntime, UnitSpec};
pub use topology::{RestartSummary, TopologyRestartPolicy};
pub use unit::{Role, UnitEntry, UnitStatus};
