// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects and Entities
//!
//! [`CidrBlock`] is the address-range value object every other part of the
//! crate is built on. [`Network`] and [`Subnetwork`] are the canonical forms of
//! the provider's isolated network and its zonal (or regional) subdivisions.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

use super::service::Instance;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Only IPv4 address blocks are supported: {0}")]
    UnsupportedFamily(String),
}

/// IPv4 address block in canonical form
///
/// Invariants:
/// - Prefix length 0-32
/// - Host bits cleared (`10.1.2.3/16` is stored as `10.1.0.0/16`)
///
/// # Examples
///
/// ```rust
/// use cim_topology::domain::CidrBlock;
///
/// let block = CidrBlock::new("10.1.2.3/16").unwrap();
/// assert_eq!(block.to_string(), "10.1.0.0/16");
/// assert!(block.overlaps(&CidrBlock::new("10.1.200.0/24").unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock(Ipv4Net);

impl CidrBlock {
    /// Parse a block from CIDR notation; a bare address is a /32
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref().trim();

        let (addr_str, prefix_len) = match cidr.split_once('/') {
            Some((addr_str, prefix_str)) => {
                let prefix_len = prefix_str
                    .parse::<u8>()
                    .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;
                (addr_str, prefix_len)
            }
            None => (cidr, 32),
        };

        let address = match IpAddr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?
        {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => return Err(NetworkError::UnsupportedFamily(cidr.to_string())),
        };

        Self::from_parts(address, prefix_len)
    }

    /// Create from an address and prefix length, clearing host bits
    pub fn from_parts(address: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        let net = Ipv4Net::new(address, prefix_len)
            .map_err(|_| NetworkError::InvalidPrefixLength(prefix_len))?;
        Ok(Self(net.trunc()))
    }

    /// Wrap an `ipnet` network, clearing host bits
    pub fn from_net(net: Ipv4Net) -> Self {
        Self(net.trunc())
    }

    /// The whole IPv4 address space, `0.0.0.0/0`
    pub fn any() -> Self {
        Self(Ipv4Net::default())
    }

    /// Underlying `ipnet` representation
    pub fn net(&self) -> Ipv4Net {
        self.0
    }

    /// First address of the block
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Last address of the block
    pub fn broadcast(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// First address as an integer
    pub fn first(&self) -> u32 {
        u32::from(self.network())
    }

    /// Last address as an integer
    pub fn last(&self) -> u32 {
        u32::from(self.broadcast())
    }

    /// Number of addresses covered
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len()))
    }

    /// True iff `other` lies entirely inside this block
    pub fn contains(&self, other: &CidrBlock) -> bool {
        self.first() <= other.first() && other.last() <= self.last()
    }

    /// True iff the two blocks share at least one address
    pub fn overlaps(&self, other: &CidrBlock) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }

    /// Split into the two blocks one prefix bit longer, or `None` for a /32
    pub fn halves(&self) -> Option<(CidrBlock, CidrBlock)> {
        if self.prefix_len() == 32 {
            return None;
        }
        let prefix_len = self.prefix_len() + 1;
        let upper_start = self.first() | (1u32 << (32 - u32::from(prefix_len)));
        let lower = Ipv4Net::new(self.network(), prefix_len).ok()?;
        let upper = Ipv4Net::new(Ipv4Addr::from(upper_start), prefix_len).ok()?;
        Some((Self(lower), Self(upper)))
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CidrBlock {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

impl From<Ipv4Net> for CidrBlock {
    fn from(net: Ipv4Net) -> Self {
        Self::from_net(net)
    }
}

/// Isolated virtual network (VPC equivalent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Provider-assigned identifier
    pub id: String,

    /// Name, unique within the provider scope
    pub name: String,

    /// Address block every subnetwork is carved from
    pub block: CidrBlock,

    pub region: String,
}

/// Subdivision of a network backing a service in one availability zone
///
/// On providers with regional subnets `zone` holds the region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnetwork {
    pub id: String,

    /// Owning network
    pub network_id: String,

    pub cidr: CidrBlock,

    pub zone: String,

    /// Instances launched into this subnetwork, ordered by id
    #[serde(default)]
    pub instances: Vec<Instance>,
}
