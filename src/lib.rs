// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network topology management for the Composable Information Machine
//!
//! Declares networks, services and the paths between them, and drives a cloud
//! provider until its resources match. Every query reads the provider afresh;
//! no topology state is cached between calls.
//!
//! # Modules
//!
//! - [`domain`]: networks, subnetworks, services, instances and paths
//! - [`cidr`]: address space allocation and exclusion arithmetic
//! - [`driver`]: the provider seam and an in-memory simulation of it
//! - [`topology`]: network and service lifecycles
//! - [`paths`]: paths compiled to and from firewall rules
//! - [`convergence`]: bounded waits on eventually consistent state
//! - [`state_machine`]: instance and path lifecycles

pub mod cidr;
pub mod config;
pub mod convergence;
pub mod domain;
pub mod driver;
pub mod errors;
pub mod paths;
pub mod state_machine;
pub mod topology;

// Re-export commonly used types
pub use config::{ConvergenceConfig, TopologyConfig};
pub use convergence::WaitPolicy;
pub use driver::{
    CloudDriver, CloudProvider, DriverError, DriverErrorKind, InMemoryDriver, SimulationSettings,
};
pub use errors::{TopologyError, TopologyResult};
pub use paths::{PathCompiler, PathGraph};
pub use topology::{
    NetworkBlueprint, NetworkManager, NetworkSpec, ServiceBlueprint, ServiceManager, ServiceSpec,
    TopologyClient,
};
