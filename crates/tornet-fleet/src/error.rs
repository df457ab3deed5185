//! Error types for the fleet crate.
//!
//! This module provides the error taxonomy for registry, allocation and
//! unit lifecycle operations.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Errors that can occur while managing the fleet.
#[derive(Debug, Error)]
pub enum FleetError {
    /// No registry entry carries the requested name.
    #[error("unit not found in registry: {0}")]
    EntryNotFound(String),

    /// An entry with the same name or address is already recorded.
    #[error("registry already holds an entry with {field} {value}")]
    DuplicateEntry {
        /// The field that collided (`name` or `address`).
        field: &'static str,
        /// The colliding value.
        value: String,
    },

    /// Every address in the allocation range is already in use.
    #[error("no free address in {first}-{last} ({in_use} in use)")]
    AllocationExhausted {
        /// First usable address of the range.
        first: Ipv4Addr,
        /// Last usable address of the range.
        last: Ipv4Addr,
        /// Number of addresses of the range already recorded.
        in_use: usize,
    },

    /// A subnet or address range could not be parsed or is empty.
    #[error("invalid subnet {subnet}: {reason}")]
    InvalidSubnet {
        /// The offending subnet text.
        subnet: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No hidden service unit exists to answer an information query.
    #[error("no hidden service unit in the fleet")]
    NoHiddenService,

    /// Network not found in the runtime.
    #[error("network not found: {0}")]
    NetworkNotFound(String),

    /// Unit creation failed.
    #[error("failed to create unit {name}: {reason}")]
    UnitCreationFailed {
        /// The unit name.
        name: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Unit start failed.
    #[error("failed to start unit {runtime_id}: {reason}")]
    UnitStartFailed {
        /// The runtime handle.
        runtime_id: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Unit stop failed.
    #[error("failed to stop unit {runtime_id}: {reason}")]
    UnitStopFailed {
        /// The runtime handle.
        runtime_id: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Unit removal failed.
    #[error("failed to remove unit {runtime_id}: {reason}")]
    UnitRemovalFailed {
        /// The runtime handle.
        runtime_id: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Command execution inside a unit failed.
    #[error("exec failed in unit {runtime_id}: {reason}")]
    ExecFailed {
        /// The runtime handle.
        runtime_id: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Timeout waiting for condition.
    #[error("timeout waiting for {condition}")]
    Timeout {
        /// The condition that timed out.
        condition: String,
    },

    /// Docker API error.
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}

impl FleetError {
    /// Creates an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound(name.into())
    }

    /// Creates a duplicate entry error.
    pub fn duplicate_entry(field: &'static str, value: impl ToString) -> Self {
        Self::DuplicateEntry {
            field,
            value: value.to_string(),
        }
    }

    /// Creates an invalid subnet error.
    pub fn invalid_subnet(subnet: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSubnet {
            subnet: subnet.into(),
            reason: reason.into(),
        }
    }

    /// Creates a network not found error.
    pub fn network_not_found(name: impl Into<String>) -> Self {
        Self::NetworkNotFound(name.into())
    }

    /// Creates a unit creation failed error.
    pub fn unit_creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnitCreationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a unit start failed error.
    pub fn unit_start_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnitStartFailed {
            runtime_id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a unit stop failed error.
    pub fn unit_stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnitStopFailed {
            runtime_id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a unit removal failed error.
    pub fn unit_removal_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnitRemovalFailed {
            runtime_id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an exec failed error.
    pub fn exec_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecFailed {
            runtime_id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(condition: impl Into<String>) -> Self {
        Self::Timeout {
            condition: condition.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Creates a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Returns true if the error means the requested target does not exist.
    ///
    /// The command line maps this class to exit code 1.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntryNotFound(_) | Self::NoHiddenService | Self::NetworkNotFound(_)
        )
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FleetError::entry_not_found("testing-tor-da-abcdefgh");
        assert_eq!(
            err.to_string(),
            "unit not found in registry: testing-tor-da-abcdefgh"
        );

        let err = FleetError::AllocationExhausted {
            first: Ipv4Addr::new(10, 5, 0, 10),
            last: Ipv4Addr::new(10, 5, 0, 12),
            in_use: 3,
        };
        assert_eq!(
            err.to_string(),
            "no free address in 10.5.0.10-10.5.0.12 (3 in use)"
        );

        let err = FleetError::duplicate_entry("address", Ipv4Addr::new(172, 30, 0, 40));
        assert_eq!(
            err.to_string(),
            "registry already holds an entry with address 172.30.0.40"
        );
    }

    #[test]
    fn test_error_is_not_found() {
        assert!(FleetError::entry_not_found("x").is_not_found());
        assert!(FleetError::NoHiddenService.is_not_found());
        assert!(FleetError::network_not_found("testing-tor").is_not_found());
        assert!(!FleetError::timeout("x").is_not_found());
        assert!(!FleetError::duplicate_entry("name", "x").is_not_found());
    }

    #[test]
    fn test_from_serde_json() {
        let err: FleetError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(matches!(err, FleetError::Serialization(_)));
    }
}
