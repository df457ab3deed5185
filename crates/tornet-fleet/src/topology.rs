//! Topology restart policy.
//!
//! Directory authority membership is written into every unit's static
//! configuration when the unit is created. The only way to make running
//! units pick up a change is a full process restart, so adding or removing
//! such a unit triggers a whole-fleet stop followed by a whole-fleet start.
//! There is no rolling or partial restart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use crate::error::Result;
use crate::lifecycle::LifecycleManager;
use crate::unit::Role;

/// Decides which role changes force a fleet restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyRestartPolicy {
    restart_roles: BTreeSet<Role>,
}

impl Default for TopologyRestartPolicy {
    fn default() -> Self {
        Self::for_roles([Role::DirectoryAuthority])
    }
}

impl TopologyRestartPolicy {
    /// A policy restarting the fleet when any of these roles change.
    pub fn for_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            restart_roles: roles.into_iter().collect(),
        }
    }

    /// A policy that never restarts.
    pub fn never() -> Self {
        Self::for_roles([])
    }

    /// Returns true if adding or removing a unit of this role requires a
    /// fleet restart.
    pub fn requires_restart(&self, role: Role) -> bool {
        self.restart_roles.contains(&role)
    }

    /// Restarts the fleet after a membership change.
    pub async fn on_da_membership_change(&self, lifecycle: &LifecycleManager) -> Result<RestartSummary> {
        info!("Directory authority membership changed, restarting fleet");
        self.restart_fleet(lifecycle).await
    }

    /// Stops every recorded unit, then starts every recorded unit.
    pub async fn restart_fleet(&self, lifecycle: &LifecycleManager) -> Result<RestartSummary> {
        let stopped = lifecycle.stop_all().await?.len();
        let started = lifecycle.start_all().await?.len();
        info!(stopped, started, "Fleet restarted");
        Ok(RestartSummary { stopped, started })
    }
}

/// Counts from one fleet restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestartSummary {
    /// Units stopped.
    pub stopped: usize,

    /// Units started.
    pub started: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{CreateOptions, LifecycleConfig};
    use crate::registry::Registry;
    use crate::runtime::memory::{Call, MemoryRuntime};
    use std::sync::Arc;

    #[test]
    fn test_default_policy() {
        let policy = TopologyRestartPolicy::default();
        assert!(policy.requires_restart(Role::DirectoryAuthority));
        for role in [Role::Relay, Role::Exit, Role::Client, Role::HiddenService] {
            assert!(!policy.requires_restart(role));
        }
        assert!(!TopologyRestartPolicy::never().requires_restart(Role::DirectoryAuthority));
    }

    #[tokio::test]
    async fn test_restart_fleet_stops_all_before_starting_any() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MemoryRuntime::new("10.5.0.0/24"));
        let manager = LifecycleManager::new(
            runtime.clone(),
            Registry::open(dir.path().join("status.json")),
            LifecycleConfig::default(),
        );
        let a = manager.create(Role::Relay, &CreateOptions::new()).await.unwrap();
        let b = manager.create(Role::Exit, &CreateOptions::new()).await.unwrap();
        manager.stop(&b).await.unwrap();
        runtime.clear_journal();

        let summary = manager.restart_all().await.unwrap();

        assert_eq!(summary, RestartSummary { stopped: 2, started: 2 });
        assert_eq!(
            runtime.journal(),
            vec![
                Call::Stop(a.runtime_id.clone()),
                Call::Stop(b.runtime_id.clone()),
                Call::Start(a.runtime_id.clone()),
                Call::Start(b.runtime_id.clone()),
            ]
        );
        assert!(runtime.is_running(&b.runtime_id));
    }

    #[tokio::test]
    async fn test_policy_without_restart_roles() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MemoryRuntime::new("10.5.0.0/24"));
        let manager = LifecycleManager::new(
            runtime.clone(),
            Registry::open(dir.path().join("status.json")),
            LifecycleConfig::default(),
        )
        .with_restart_policy(TopologyRestartPolicy::never());

        let outcome = manager
            .add(Role::DirectoryAuthority, 1, &CreateOptions::new())
            .await
            .unwrap();

        assert!(outcome.restart.is_none());
        let created = &outcome.created[0];
        assert_eq!(
            runtime.journal(),
            vec![
                Call::Create(created.name.clone()),
                Call::Start(created.runtime_id.clone())
            ]
        );
    }
}
