//! Overlay address allocation.
//!
//! Addresses are drawn at random from a usable range and re-drawn while they
//! collide with an address already recorded in the registry. Two policies
//! produce the range:
//!
//! - [`AllocationPolicy::RandomInSubnet`]: the whole runtime network subnet,
//!   minus a reserved prefix for infrastructure and the broadcast address.
//! - [`AllocationPolicy::RandomOctet`]: a static three-octet prefix with the
//!   last octet drawn from a bounded range.
//!
//! Allocation always terminates: a full range fails up front, and after a
//! bounded number of random draws the allocator sweeps the range linearly.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::debug;

use crate::error::{FleetError, Result};

/// Addresses at the start of a subnet kept for the gateway and other infrastructure.
pub const DEFAULT_RESERVED_ADDRESSES: u32 = 32;

/// Random draws attempted before falling back to a sweep.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

/// An IPv4 subnet in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// Creates a subnet, clearing any host bits of `address`.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(FleetError::invalid_subnet(
                format!("{address}/{prefix_len}"),
                "prefix length exceeds 32",
            ));
        }
        let network = Ipv4Addr::from(u32::from(address) & mask(prefix_len));
        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// Returns the network address.
    pub fn network_address(&self) -> Ipv4Addr {
        self.network
    }

    /// Returns the broadcast address.
    pub fn broadcast_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix_len))
    }

    /// Returns true if the address lies inside the subnet.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & mask(self.prefix_len) == u32::from(self.network)
    }
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

impl FromStr for Subnet {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        let (address, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| FleetError::invalid_subnet(s, "expected <address>/<prefix>"))?;
        let address: Ipv4Addr = address
            .parse()
            .map_err(|e| FleetError::invalid_subnet(s, format!("bad address: {e}")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|e| FleetError::invalid_subnet(s, format!("bad prefix length: {e}")))?;
        Self::new(address, prefix_len)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// An inclusive range of usable addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    first: Ipv4Addr,
    last: Ipv4Addr,
}

impl AddressRange {
    /// Creates a range from its first and last address.
    pub fn new(first: Ipv4Addr, last: Ipv4Addr) -> Result<Self> {
        if first > last {
            return Err(FleetError::invalid_subnet(
                format!("{first}-{last}"),
                "range is empty",
            ));
        }
        Ok(Self { first, last })
    }

    /// The usable part of a subnet: skips `reserved` leading addresses and
    /// the broadcast address.
    pub fn from_subnet(subnet: &Subnet, reserved: u32) -> Result<Self> {
        let network = u64::from(u32::from(subnet.network_address()));
        let broadcast = u64::from(u32::from(subnet.broadcast_address()));
        let first = network + u64::from(reserved);
        if broadcast == 0 || first > broadcast - 1 {
            return Err(FleetError::invalid_subnet(
                subnet.to_string(),
                format!("no usable addresses after reserving {reserved}"),
            ));
        }
        Self::new(
            Ipv4Addr::from(first as u32),
            Ipv4Addr::from((broadcast - 1) as u32),
        )
    }

    /// `a.b.c.min` through `a.b.c.max`.
    pub fn from_octet_prefix(prefix: [u8; 3], min: u8, max: u8) -> Result<Self> {
        let [a, b, c] = prefix;
        Self::new(Ipv4Addr::new(a, b, c, min), Ipv4Addr::new(a, b, c, max))
    }

    /// Returns the first usable address.
    pub fn first(&self) -> Ipv4Addr {
        self.first
    }

    /// Returns the last usable address.
    pub fn last(&self) -> Ipv4Addr {
        self.last
    }

    /// Returns the number of addresses in the range.
    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.last)) - u64::from(u32::from(self.first)) + 1
    }

    /// Always false; a range holds at least one address.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if the address lies inside the range.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        self.first <= address && address <= self.last
    }
}

/// How the usable address range is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Anywhere in the runtime network's subnet after a reserved prefix.
    RandomInSubnet {
        /// Leading addresses of the subnet never handed out.
        reserved: u32,
    },

    /// A fixed three-octet prefix with a random last octet.
    RandomOctet {
        /// The fixed leading octets.
        prefix: [u8; 3],
        /// Lowest last octet handed out.
        min: u8,
        /// Highest last octet handed out.
        max: u8,
    },
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self::RandomInSubnet {
            reserved: DEFAULT_RESERVED_ADDRESSES,
        }
    }
}

impl AllocationPolicy {
    /// Returns true if the policy needs the runtime network's subnet.
    pub fn needs_subnet(&self) -> bool {
        matches!(self, Self::RandomInSubnet { .. })
    }

    /// Resolves the usable range.
    pub fn range(&self, subnet: Option<&Subnet>) -> Result<AddressRange> {
        match self {
            Self::RandomInSubnet { reserved } => {
                let subnet = subnet.ok_or_else(|| {
                    FleetError::configuration("subnet allocation requires the network subnet")
                })?;
                AddressRange::from_subnet(subnet, *reserved)
            }
            Self::RandomOctet { prefix, min, max } => {
                AddressRange::from_octet_prefix(*prefix, *min, *max)
            }
        }
    }
}

/// Hands out addresses that are not yet recorded.
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    policy: AllocationPolicy,
    max_attempts: u32,
}

impl AddressAllocator {
    /// Creates an allocator for the given policy.
    pub fn new(policy: AllocationPolicy) -> Self {
        Self {
            policy,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the number of random draws before sweeping.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns the allocation policy.
    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    /// Picks a free address in `range`.
    pub fn allocate(&self, range: &AddressRange, used: &HashSet<Ipv4Addr>) -> Result<Ipv4Addr> {
        self.allocate_with(range, used, &mut rand::thread_rng())
    }

    /// Picks a free address in `range` using the given random source.
    pub fn allocate_with<R: Rng + ?Sized>(
        &self,
        range: &AddressRange,
        used: &HashSet<Ipv4Addr>,
        rng: &mut R,
    ) -> Result<Ipv4Addr> {
        let in_use = used.iter().filter(|addr| range.contains(**addr)).count();
        let exhausted = || FleetError::AllocationExhausted {
            first: range.first(),
            last: range.last(),
            in_use,
        };
        if in_use as u64 >= range.len() {
            return Err(exhausted());
        }

        let first = u32::from(range.first());
        let last = u32::from(range.last());

        for attempt in 0..self.max_attempts {
            let candidate = Ipv4Addr::from(rng.gen_range(first..=last));
            if !used.contains(&candidate) {
                debug!(address = %candidate, attempt, "Allocated address");
                return Ok(candidate);
            }
        }

        let len = range.len();
        let offset = rng.gen_range(0..len);
        for step in 0..len {
            let candidate = Ipv4Addr::from(first + ((offset + step) % len) as u32);
            if !used.contains(&candidate) {
                debug!(address = %candidate, "Allocated address by sweep");
                return Ok(candidate);
            }
        }

        Err(exhausted())
    }
}

impl Default for AddressAllocator {
    fn default() -> Self {
        Self::new(AllocationPolicy::default())
    }
}
