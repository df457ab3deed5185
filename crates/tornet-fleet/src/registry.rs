//! Persisted registry of provisioned units.
//!
//! The registry is a single JSON document holding an ordered array of
//! [`UnitEntry`] values. It is the only record of which units exist; nothing
//! is cached in memory between operations.
//!
//! Every operation runs as one read-modify-write cycle under an exclusive
//! advisory lock on a sidecar `<document>.lock` file, so concurrent
//! invocations of the command line serialise instead of overwriting each
//! other's changes. Writes go to a temporary file that is renamed over the
//! document.

use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{FleetError, Result};
use crate::unit::UnitEntry;

/// File-backed unit registry.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    /// Opens the registry stored at `path`.
    ///
    /// Nothing touches the filesystem until the first operation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the registry document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every entry, in document order.
    ///
    /// Creates an empty document if none exists yet.
    pub fn list(&self) -> Result<Vec<UnitEntry>> {
        self.read(|entries| Ok(entries.to_vec()))
    }

    /// Finds the entry with exactly this name.
    pub fn find(&self, name: &str) -> Result<UnitEntry> {
        self.read(|entries| {
            entries
                .iter()
                .find(|entry| entry.name == name)
                .cloned()
                .ok_or_else(|| FleetError::entry_not_found(name))
        })
    }

    /// Appends an entry.
    ///
    /// Fails with [`FleetError::DuplicateEntry`] if the name or the address is
    /// already recorded.
    pub fn append(&self, entry: UnitEntry) -> Result<()> {
        self.write(|entries| {
            if entries.iter().any(|e| e.name == entry.name) {
                return Err(FleetError::duplicate_entry("name", &entry.name));
            }
            if entries.iter().any(|e| e.address == entry.address) {
                return Err(FleetError::duplicate_entry("address", entry.address));
            }
            debug!(unit = %entry.name, address = %entry.address, "Recording unit");
            entries.push(entry);
            Ok(())
        })
    }

    /// Removes the entry with this name, returning it if it was present.
    pub fn remove(&self, name: &str) -> Result<Option<UnitEntry>> {
        self.write(|entries| {
            let removed = entries
                .iter()
                .position(|e| e.name == name)
                .map(|idx| entries.remove(idx));
            if removed.is_none() {
                warn!(unit = %name, "Unit was not recorded in registry");
            }
            Ok(removed)
        })
    }

    /// Mutates the entry with this name in place and returns the new value.
    ///
    /// The entry keeps its position. The mutator must not rename the entry.
    pub fn update<F>(&self, name: &str, mutate: F) -> Result<UnitEntry>
    where
        F: FnOnce(&mut UnitEntry),
    {
        self.write(|entries| {
            let entry = entries
                .iter_mut()
                .find(|e| e.name == name)
                .ok_or_else(|| FleetError::entry_not_found(name))?;
            mutate(entry);
            if entry.name != name {
                return Err(FleetError::validation(format!(
                    "registry update may not rename {name} to {}",
                    entry.name
                )));
            }
            Ok(entry.clone())
        })
    }

    /// Returns every address recorded, whatever the entry's status.
    pub fn addresses_in_use(&self) -> Result<HashSet<Ipv4Addr>> {
        self.read(|entries| Ok(entries.iter().map(|e| e.address).collect()))
    }

    /// Returns every recorded unit name.
    pub fn names_in_use(&self) -> Result<HashSet<String>> {
        self.read(|entries| Ok(entries.iter().map(|e| e.name.clone()).collect()))
    }

    /// Deletes the registry document.
    pub fn destroy(&self) -> Result<()> {
        let _lock = RegistryLock::acquire(&self.lock_path())?;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Deleted registry document");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&[UnitEntry]) -> Result<T>) -> Result<T> {
        let _lock = RegistryLock::acquire(&self.lock_path())?;
        let entries = self.load_or_init()?;
        f(&entries)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Vec<UnitEntry>) -> Result<T>) -> Result<T> {
        let _lock = RegistryLock::acquire(&self.lock_path())?;
        let mut entries = self.load_or_init()?;
        let out = f(&mut entries)?;
        self.store(&entries)?;
        Ok(out)
    }

    fn load_or_init(&self) -> Result<Vec<UnitEntry>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.store(&[])?;
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, entries: &[UnitEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let temp_path = sibling(&self.path, "tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }
}

/// `<path>.<ext>` next to the document.
fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Exclusive advisory lock held for the duration of one registry operation.
struct RegistryLock {
    file: File,
}

impl RegistryLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{Role, UnitStatus};

    fn entry(name: &str, octet: u8) -> UnitEntry {
        UnitEntry::new(
            Role::Relay,
            name,
            format!("id-{name}"),
            Ipv4Addr::new(172, 30, 0, octet),
        )
    }

    fn temp_registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("state").join("status.json"));
        (dir, registry)
    }

    #[test]
    fn test_list_initializes_missing_document() {
        let (_dir, registry) = temp_registry();
        assert!(!registry.path().exists());

        assert!(registry.list().unwrap().is_empty());
        assert!(registry.path().exists());
        let content = fs::read_to_string(registry.path()).unwrap();
        let parsed: Vec<UnitEntry> = serde_json::from_str(&content).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_find_and_remove() {
        let (_dir, registry) = temp_registry();
        registry.append(entry("relay-a", 40)).unwrap();
        registry.append(entry("relay-b", 41)).unwrap();

        assert_eq!(registry.find("relay-b").unwrap().address, Ipv4Addr::new(172, 30, 0, 41));
        assert!(registry.find("relay").unwrap_err().is_not_found());

        let removed = registry.remove("relay-a").unwrap();
        assert_eq!(removed.map(|e| e.name), Some("relay-a".to_string()));
        assert!(registry.find("relay-a").unwrap_err().is_not_found());
        assert!(registry.remove("relay-a").unwrap().is_none());
    }

    #[test]
    fn test_append_rejects_duplicates() {
        let (_dir, registry) = temp_registry();
        registry.append(entry("relay-a", 40)).unwrap();

        let err = registry.append(entry("relay-a", 50)).unwrap_err();
        assert!(matches!(err, FleetError::DuplicateEntry { field: "name", .. }));

        let err = registry.append(entry("relay-b", 40)).unwrap_err();
        assert!(matches!(err, FleetError::DuplicateEntry { field: "address", .. }));

        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_update_keeps_position() {
        let (_dir, registry) = temp_registry();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            registry.append(entry(name, 40 + i as u8)).unwrap();
        }

        let updated = registry
            .update("a", |e| e.status = UnitStatus::Stopped)
            .unwrap();
        assert_eq!(updated.status, UnitStatus::Stopped);

        let names: Vec<_> = registry.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(registry.find("a").unwrap().status, UnitStatus::Stopped);

        assert!(registry.update("zzz", |_| {}).unwrap_err().is_not_found());
        assert!(registry
            .update("b", |e| e.name = "renamed".to_string())
            .is_err());
        assert!(registry.find("b").is_ok());
    }

    #[test]
    fn test_addresses_in_use_includes_stopped() {
        let (_dir, registry) = temp_registry();
        registry.append(entry("a", 40)).unwrap();
        registry
            .append(entry("b", 41).with_status(UnitStatus::Stopped))
            .unwrap();

        let used = registry.addresses_in_use().unwrap();
        assert_eq!(used.len(), 2);
        assert!(used.contains(&Ipv4Addr::new(172, 30, 0, 41)));
    }

    #[test]
    fn test_destroy() {
        let (_dir, registry) = temp_registry();
        registry.append(entry("a", 40)).unwrap();
        registry.destroy().unwrap();
        assert!(!registry.path().exists());
        registry.destroy().unwrap();
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_reads_existing_document() {
        let (_dir, registry) = temp_registry();
        fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        fs::write(
            registry.path(),
            r#"[{"container_name": "testing-tor-hs-abcdefgh", "container_id": "c0ffee",
                 "status": "STOPPED", "role": "HS", "ip_addr": "172.30.0.200"}]"#,
        )
        .unwrap();

        let found = registry.find("testing-tor-hs-abcdefgh").unwrap();
        assert_eq!(found.role, Role::HiddenService);
        assert_eq!(found.status, UnitStatus::Stopped);
        assert_eq!(found.runtime_id, "c0ffee");
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let (_dir, registry) = temp_registry();
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let registry = Registry::open(registry.path());
                std::thread::spawn(move || {
                    for j in 0..5u8 {
                        registry
                            .append(entry(&format!("unit-{i}-{j}"), i * 10 + j + 1))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.list().unwrap().len(), 40);
    }
}
