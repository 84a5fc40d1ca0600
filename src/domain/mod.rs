// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Domain Models
//!
//! Canonical forms of everything the provider holds, produced only at the
//! provider boundary (see [`crate::driver::canonical`]) and consumed
//! everywhere else.
//!
//! # Value Objects with Invariants
//!
//! - [`CidrBlock`] - canonical IPv4 address block
//! - [`PortSpec`] / [`Protocol`] - what a path permits
//! - [`Endpoint`] / [`ServiceRef`] - either side of a path
//!
//! # Entities
//!
//! - [`Network`] - isolated address space
//! - [`Subnetwork`] - zonal subdivision owned by one network
//! - [`Service`] - named instance group, the unit of connectivity policy
//! - [`Instance`] - compute instance with lifecycle state
//! - [`Path`] - permitted connection edge

pub mod invariants;
pub mod network;
pub mod path;
pub mod service;

pub use invariants::{ValidationError, ValidationResult};
pub use network::{CidrBlock, Network, NetworkError, Subnetwork};
pub use path::{Endpoint, Path, PortSpec, Protocol, ServiceRef};
pub use service::{Instance, InstanceState, Service};
