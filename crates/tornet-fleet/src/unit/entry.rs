//! Registry entries and unit identities.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::role::{Role, UnitStatus};

/// Length of the random suffix appended to unit names.
pub const SUFFIX_LEN: usize = 8;

/// One provisioned unit as recorded in the registry.
///
/// Field names on the wire match the persisted document:
/// `container_name`, `container_id`, `status`, `role`, `ip_addr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEntry {
    /// Globally unique unit name.
    #[serde(rename = "container_name")]
    pub name: String,

    /// Opaque handle assigned by the runtime.
    #[serde(rename = "container_id")]
    pub runtime_id: String,

    /// Last recorded status.
    pub status: UnitStatus,

    /// Role of the unit.
    pub role: Role,

    /// Address on the overlay network.
    #[serde(rename = "ip_addr")]
    pub address: Ipv4Addr,
}

impl UnitEntry {
    /// Creates an entry for a freshly started unit.
    pub fn new(
        role: Role,
        name: impl Into<String>,
        runtime_id: impl Into<String>,
        address: Ipv4Addr,
    ) -> Self {
        Self {
            name: name.into(),
            runtime_id: runtime_id.into(),
            status: UnitStatus::Running,
            role,
            address,
        }
    }

    /// Returns a copy with the given status.
    pub fn with_status(mut self, status: UnitStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns true if the unit was last recorded as running.
    pub fn is_running(&self) -> bool {
        self.status == UnitStatus::Running
    }

    /// Returns the short runtime handle (first 12 characters).
    pub fn short_id(&self) -> &str {
        match self.runtime_id.char_indices().nth(12) {
            Some((idx, _)) => &self.runtime_id[..idx],
            None => &self.runtime_id,
        }
    }
}

/// Name and Tor nickname generated for a new unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitIdentity {
    /// Unit name, `<prefix>-<role>-<suffix>`.
    pub name: String,

    /// Tor nickname, `<role><suffix>`.
    pub nickname: String,
}

impl UnitIdentity {
    /// Generates an identity with a random lower-case suffix.
    pub fn generate<R: Rng + ?Sized>(prefix: &str, role: Role, rng: &mut R) -> Self {
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
            .collect();
        Self::with_suffix(prefix, role, &suffix)
    }

    /// Builds an identity from an explicit suffix.
    pub fn with_suffix(prefix: &str, role: Role, suffix: &str) -> Self {
        Self {
            name: format!("{}-{}-{}", prefix, role.token(), suffix),
            nickname: format!("{}{}", role.token(), suffix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_entry_round_trip_all_variants() {
        for role in Role::ALL {
            for status in [UnitStatus::Running, UnitStatus::Stopped] {
                let entry = UnitEntry::new(role, "unit", "abc", Ipv4Addr::new(172, 30, 0, 99))
                    .with_status(status);
                let json = serde_json::to_string(&entry).unwrap();
                let parsed: UnitEntry = serde_json::from_str(&json).unwrap();
                assert_eq!(parsed, entry);
            }
        }
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = UnitEntry::new(
            Role::Relay,
            "testing-tor-relay-qwertyui",
            "f00d",
            Ipv4Addr::new(172, 30, 0, 77),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["container_name"], "testing-tor-relay-qwertyui");
        assert_eq!(value["container_id"], "f00d");
        assert_eq!(value["status"], "RUNNING");
        assert_eq!(value["role"], "RELAY");
        assert_eq!(value["ip_addr"], "172.30.0.77");
    }

    #[test]
    fn test_short_id() {
        let entry = UnitEntry::new(
            Role::Exit,
            "x",
            "0123456789abcdef0123",
            Ipv4Addr::new(10, 0, 0, 1),
        );
        assert_eq!(entry.short_id(), "0123456789ab");

        let entry = UnitEntry::new(Role::Exit, "x", "abc", Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(entry.short_id(), "abc");
    }

    #[test]
    fn test_identity_generation() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let identity = UnitIdentity::generate("testing-tor", Role::DirectoryAuthority, &mut rng);

        let suffix = identity.name.strip_prefix("testing-tor-da-").unwrap();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
        assert_eq!(identity.nickname, format!("da{suffix}"));
    }
}
