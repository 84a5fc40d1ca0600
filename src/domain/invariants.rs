// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Domain Invariants
//!
//! Business rules for topology requests, checked before any provider call.
//! All functions are pure (no side effects) and return detailed validation
//! results.
//!
//! # Invariant Categories
//!
//! 1. **Naming**: network and service names usable in provider identifiers
//! 2. **Addressing**: prefix lengths and subnet placement
//! 3. **Paths**: endpoint combinations the firewall model can express
//! 4. **Destruction**: ordering constraints on teardown

use super::network::CidrBlock;
use super::path::Endpoint;

/// Validation result with detailed error information
pub type ValidationResult = Result<(), ValidationError>;

/// Validation error with context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Name unusable as a provider identifier component
    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Requested prefix does not fit the parent block
    #[error("Prefix length /{prefix_len} is not valid inside {parent}")]
    InvalidPrefixLength { parent: CidrBlock, prefix_len: u8 },

    /// Subnet is not inside its network's block
    #[error("Subnet {subnet} is outside network block {network}")]
    SubnetOutsideNetwork { subnet: CidrBlock, network: CidrBlock },

    /// Block collides with an existing allocation
    #[error("Block {block} overlaps existing block {existing}")]
    OverlappingBlock { block: CidrBlock, existing: CidrBlock },

    /// Path endpoints cannot be expressed as an ingress rule
    #[error("Invalid path {from} -> {to}: {reason}")]
    InvalidPath {
        from: String,
        to: String,
        reason: String,
    },

    /// Network still owns subnetworks
    #[error("Network {network} still has {live_subnets} live subnetworks")]
    NetworkNotEmpty { network: String, live_subnets: usize },
}

/// Validate a network or service name
///
/// # Rules
/// - Must not be empty
/// - At most 63 characters
/// - ASCII alphanumerics and `-` only (`.` and `/` are used as separators)
pub fn validate_name(name: &str) -> ValidationResult {
    let invalid = |reason: &str| ValidationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > 63 {
        return Err(invalid("must be at most 63 characters"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid("only ASCII letters, digits and '-' are allowed"));
    }
    Ok(())
}

/// Validate a prefix length can be carved out of `parent`
///
/// # Rules
/// - Must be at least the parent's prefix length
/// - Must be at most 32
pub fn validate_prefix_len(parent: &CidrBlock, prefix_len: u8) -> ValidationResult {
    if prefix_len < parent.prefix_len() || prefix_len > 32 {
        return Err(ValidationError::InvalidPrefixLength {
            parent: *parent,
            prefix_len,
        });
    }
    Ok(())
}

/// Validate a subnet fits inside its network and collides with no sibling
pub fn validate_subnet_placement(
    network: &CidrBlock,
    subnet: &CidrBlock,
    siblings: &[CidrBlock],
) -> ValidationResult {
    if !network.contains(subnet) {
        return Err(ValidationError::SubnetOutsideNetwork {
            subnet: *subnet,
            network: *network,
        });
    }
    validate_disjoint(subnet, siblings)
}

/// Validate a block overlaps none of `existing`
pub fn validate_disjoint(block: &CidrBlock, existing: &[CidrBlock]) -> ValidationResult {
    if let Some(existing) = existing.iter().find(|e| e.overlaps(block)) {
        return Err(ValidationError::OverlappingBlock {
            block: *block,
            existing: *existing,
        });
    }
    Ok(())
}

/// Validate a path can be compiled into an ingress rule
///
/// # Rules
/// - At least one endpoint must be a service
/// - The destination must be a service (rules live on its group)
/// - Two service endpoints must share a network
pub fn validate_path_endpoints(source: &Endpoint, destination: &Endpoint) -> ValidationResult {
    let invalid = |reason: &str| ValidationError::InvalidPath {
        from: source.to_string(),
        to: destination.to_string(),
        reason: reason.to_string(),
    };

    match (source, destination) {
        (Endpoint::Cidr { .. }, Endpoint::Cidr { .. }) => {
            Err(invalid("at least one endpoint must be a service"))
        }
        (Endpoint::Service(_), Endpoint::Cidr { .. }) => {
            Err(invalid("destination must be a service"))
        }
        (Endpoint::Service(src), Endpoint::Service(dst)) if src.network != dst.network => {
            Err(invalid("services must share a network"))
        }
        _ => Ok(()),
    }
}

/// Validate a network can be destroyed
///
/// # Rules
/// - No subnetwork may remain
pub fn validate_network_destroyable(network: &str, live_subnets: usize) -> ValidationResult {
    if live_subnets > 0 {
        return Err(ValidationError::NetworkNotEmpty {
            network: network.to_string(),
            live_subnets,
        });
    }
    Ok(())
}
