//! Information queries answered by reading files inside hidden service units.

use tracing::debug;

use crate::error::{FleetError, Result};
use crate::lifecycle::LifecycleManager;
use crate::registry::Registry;
use crate::runtime::SharedRuntime;
use crate::unit::{Role, UnitEntry};

/// Tor configuration file inside a unit.
pub const TORRC_PATH: &str = "/etc/tor/torrc";

/// Onion hostname file written by a hidden service unit.
pub const ONION_HOSTNAME_PATH: &str = "/var/lib/tor/hidden_service/hostname";

/// Reads configuration and onion names out of running units.
pub struct FleetInspector {
    runtime: SharedRuntime,
    registry: Registry,
}

impl FleetInspector {
    /// Creates an inspector.
    pub fn new(runtime: SharedRuntime, registry: Registry) -> Self {
        Self { runtime, registry }
    }

    /// Creates an inspector sharing the manager's runtime and registry.
    pub fn from_lifecycle(lifecycle: &LifecycleManager) -> Self {
        Self::new(lifecycle.runtime().clone(), lifecycle.registry().clone())
    }

    /// Returns the non-comment lines of the first hidden service's torrc.
    ///
    /// The result is a working example for attaching an external hidden
    /// service to the network.
    pub async fn hidden_service_torrc(&self) -> Result<Vec<String>> {
        let entry = self.first_hidden_service()?;
        let content = self.read_file(&entry, TORRC_PATH).await?;
        Ok(strip_comment_lines(&content))
    }

    /// Returns the onion address of the named hidden service, or of the
    /// first one when no name is given.
    pub async fn onion_domain(&self, name: Option<&str>) -> Result<String> {
        let entry = match name {
            Some(name) => {
                let entry = self.registry.find(name)?;
                if entry.role != Role::HiddenService {
                    return Err(FleetError::validation(format!(
                        "unit {name} is a {} unit, not a hidden service",
                        entry.role.description()
                    )));
                }
                entry
            }
            None => self.first_hidden_service()?,
        };

        let content = self.read_file(&entry, ONION_HOSTNAME_PATH).await?;
        Ok(content.trim().to_string())
    }

    fn first_hidden_service(&self) -> Result<UnitEntry> {
        self.registry
            .list()?
            .into_iter()
            .find(|entry| entry.role == Role::HiddenService)
            .ok_or(FleetError::NoHiddenService)
    }

    async fn read_file(&self, entry: &UnitEntry, path: &str) -> Result<String> {
        debug!(unit = %entry.name, path, "Reading file from unit");
        let output = self.runtime.exec(&entry.runtime_id, &["cat", path]).await?;
        if !output.success() {
            return Err(FleetError::exec_failed(
                &entry.runtime_id,
                format!("cat {path} exited {}: {}", output.exit_code, output.combined_output()),
            ));
        }
        Ok(output.stdout)
    }
}

/// Drops lines starting with `#` after trimming leading whitespace from the
/// whole text.
fn strip_comment_lines(content: &str) -> Vec<String> {
    content
        .trim_start()
        .split('\n')
        .filter(|line| !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{CreateOptions, LifecycleConfig};
    use crate::runtime::memory::MemoryRuntime;
    use crate::runtime::ExecOutput;
    use std::sync::Arc;

    const TORRC: &str = "\n\n# generated\nSocksPort 0\n# hidden service\nHiddenServiceDir /var/lib/tor/hidden_service\nHiddenServicePort 80 127.0.0.1:80\n";

    fn setup() -> (tempfile::TempDir, Arc<MemoryRuntime>, LifecycleManager) {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MemoryRuntime::new("172.30.0.0/24"));
        let manager = LifecycleManager::new(
            runtime.clone(),
            Registry::open(dir.path().join("status.json")),
            LifecycleConfig::default(),
        );
        (dir, runtime, manager)
    }

    #[test]
    fn test_strip_comment_lines() {
        assert_eq!(
            strip_comment_lines(TORRC),
            vec![
                "SocksPort 0",
                "HiddenServiceDir /var/lib/tor/hidden_service",
                "HiddenServicePort 80 127.0.0.1:80",
                ""
            ]
        );
        assert_eq!(strip_comment_lines("  ExitPolicy reject *:*"), vec!["ExitPolicy reject *:*"]);
    }

    #[tokio::test]
    async fn test_queries_without_hidden_service() {
        let (_dir, _runtime, manager) = setup();
        manager.create(Role::Relay, &CreateOptions::new()).await.unwrap();
        let inspector = FleetInspector::from_lifecycle(&manager);

        let err = inspector.hidden_service_torrc().await.unwrap_err();
        assert!(matches!(err, FleetError::NoHiddenService));
        assert!(err.is_not_found());

        let err = inspector.onion_domain(None).await.unwrap_err();
        assert!(matches!(err, FleetError::NoHiddenService));
    }

    #[tokio::test]
    async fn test_hidden_service_torrc() {
        let (_dir, runtime, manager) = setup();
        manager.create(Role::Relay, &CreateOptions::new()).await.unwrap();
        manager
            .create(Role::HiddenService, &CreateOptions::new())
            .await
            .unwrap();
        runtime.script_exec("cat /etc/tor/torrc", ExecOutput::new(TORRC, "", 0));

        let lines = FleetInspector::from_lifecycle(&manager)
            .hidden_service_torrc()
            .await
            .unwrap();

        assert_eq!(lines[0], "SocksPort 0");
        assert!(lines.iter().all(|l| !l.starts_with('#')));
    }

    #[tokio::test]
    async fn test_onion_domain() {
        let (_dir, runtime, manager) = setup();
        let relay = manager.create(Role::Relay, &CreateOptions::new()).await.unwrap();
        let hs = manager
            .create(Role::HiddenService, &CreateOptions::new())
            .await
            .unwrap();
        runtime.script_exec(
            "cat /var/lib/tor/hidden_service/hostname",
            ExecOutput::new("abcdefghijklmnop.onion\n", "", 0),
        );
        let inspector = FleetInspector::from_lifecycle(&manager);

        assert_eq!(inspector.onion_domain(None).await.unwrap(), "abcdefghijklmnop.onion");
        assert_eq!(
            inspector.onion_domain(Some(&hs.name)).await.unwrap(),
            "abcdefghijklmnop.onion"
        );
        assert!(matches!(
            inspector.onion_domain(Some(&relay.name)).await.unwrap_err(),
            FleetError::Validation(_)
        ));
        assert!(inspector
            .onion_domain(Some("testing-tor-hs-missing"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_failed_read_is_an_error() {
        let (_dir, runtime, manager) = setup();
        manager
            .create(Role::HiddenService, &CreateOptions::new())
            .await
            .unwrap();
        runtime.script_exec(
            "cat /var/lib/tor/hidden_service/hostname",
            ExecOutput::new("", "No such file or directory", 1),
        );

        let err = FleetInspector::from_lifecycle(&manager)
            .onion_domain(None)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::ExecFailed { .. }));
    }
}
