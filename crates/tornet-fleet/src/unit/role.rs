//! Unit roles and statuses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FleetError;

/// The role a unit plays in the private Tor network.
///
/// The set is closed: every unit is exactly one of these five. The serialized
/// form is the short upper-case tag stored in the registry document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Publishes the consensus membership document.
    #[serde(rename = "DA")]
    DirectoryAuthority,

    /// Middle or guard relay.
    #[serde(rename = "RELAY")]
    Relay,

    /// Exit relay.
    #[serde(rename = "EXIT")]
    Exit,

    /// Entry point for external traffic (SOCKS proxy).
    #[serde(rename = "CLIENT")]
    Client,

    /// Exposes a backend service reachable only through the overlay.
    #[serde(rename = "HS")]
    HiddenService,
}

impl Role {
    /// All roles, in the order they are usually provisioned.
    pub const ALL: [Role; 5] = [
        Role::DirectoryAuthority,
        Role::Relay,
        Role::Exit,
        Role::Client,
        Role::HiddenService,
    ];

    /// Returns the registry tag (`DA`, `RELAY`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::DirectoryAuthority => "DA",
            Self::Relay => "RELAY",
            Self::Exit => "EXIT",
            Self::Client => "CLIENT",
            Self::HiddenService => "HS",
        }
    }

    /// Returns the lower-case token used in unit names and the `ROLE` variable.
    pub fn token(&self) -> &'static str {
        match self {
            Self::DirectoryAuthority => "da",
            Self::Relay => "relay",
            Self::Exit => "exit",
            Self::Client => "client",
            Self::HiddenService => "hs",
        }
    }

    /// Returns a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::DirectoryAuthority => "directory authority",
            Self::Relay => "middle/guard relay",
            Self::Exit => "exit relay",
            Self::Client => "client",
            Self::HiddenService => "hidden service",
        }
    }

    /// Returns true for the directory authority role.
    pub fn is_directory_authority(&self) -> bool {
        matches!(self, Self::DirectoryAuthority)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Role {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.tag().eq_ignore_ascii_case(s) || role.token().eq_ignore_ascii_case(s))
            .ok_or_else(|| FleetError::validation(format!("unknown role: {s}")))
    }
}

/// Last recorded status of a unit.
///
/// This is what the lifecycle manager last wrote, not a live observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    /// The unit was last started.
    #[serde(rename = "RUNNING")]
    Running,

    /// The unit was last stopped.
    #[serde(rename = "STOPPED")]
    Stopped,
}

impl UnitStatus {
    /// Returns the registry tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tags_and_tokens() {
        assert_eq!(Role::DirectoryAuthority.tag(), "DA");
        assert_eq!(Role::HiddenService.token(), "hs");
        assert_eq!(Role::Relay.to_string(), "RELAY");
        assert!(Role::DirectoryAuthority.is_directory_authority());
        assert!(!Role::Exit.is_directory_authority());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("DA".parse::<Role>().unwrap(), Role::DirectoryAuthority);
        assert_eq!("hs".parse::<Role>().unwrap(), Role::HiddenService);
        assert_eq!("Client".parse::<Role>().unwrap(), Role::Client);
        assert!("bridge".parse::<Role>().is_err());
    }

    #[test]
    fn test_serialized_tags() {
        assert_eq!(
            serde_json::to_string(&Role::DirectoryAuthority).unwrap(),
            "\"DA\""
        );
        assert_eq!(
            serde_json::to_string(&UnitStatus::Stopped).unwrap(),
            "\"STOPPED\""
        );
        let role: Role = serde_json::from_str("\"EXIT\"").unwrap();
        assert_eq!(role, Role::Exit);
    }
}
