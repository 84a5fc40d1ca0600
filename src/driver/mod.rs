// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cloud Driver Boundary
//!
//! The minimal capability the topology core consumes from a cloud provider,
//! and the provider-native records it returns.
//!
//! # Architecture
//!
//! ```text
//! TopologyClient ──▶ CloudDriver ──▶ Native* records
//!                                        │
//!                                  canonical::*  (validate + convert)
//!                                        ▼
//!                                 domain entities
//! ```
//!
//! Native records are deliberately loose (CIDRs and states are strings,
//! metadata is a tag map) the way provider APIs return them. Nothing outside
//! [`canonical`] reads them.
//!
//! # Implementations
//!
//! - [`InMemoryDriver`] - complete in-process provider with configurable
//!   eventual-consistency lag, used by tests and local experimentation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod canonical;
pub mod error;
pub mod memory;

pub use error::{DriverError, DriverErrorKind, DriverResult};
pub use memory::{InMemoryDriver, SimulationSettings};

/// Tag carrying a resource's human-readable name
pub const NAME_TAG: &str = "Name";

/// Tag associating a subnet with the service that owns it
pub const SERVICE_TAG: &str = "cim:service";

/// Provider resource tags
pub type Tags = BTreeMap<String, String>;

/// Supported cloud providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Zonal subnets, one per availability zone
    Aws,
    /// Regional subnets, one per service
    Gce,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gce => "gce",
        }
    }

    /// Whether a service gets one subnet for the whole region
    pub fn has_regional_subnets(&self) -> bool {
        matches!(self, Self::Gce)
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "gce" => Ok(Self::Gce),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Virtual network as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeNetwork {
    pub id: String,
    pub cidr: String,
    pub region: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSubnet {
    pub id: String,
    pub network_id: String,
    pub cidr: String,
    /// Availability zone, or the region for regional subnets
    pub zone: String,
    #[serde(default)]
    pub tags: Tags,
}

/// One ingress permission on an access-control group
///
/// A single rule may name several remote groups and address ranges; each of
/// them is a separate permitted path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeRule {
    pub protocol: String,
    pub port: u16,
    #[serde(default)]
    pub source_groups: Vec<String>,
    #[serde(default)]
    pub source_cidrs: Vec<String>,
}

impl NativeRule {
    /// Rule admitting traffic from another access-control group
    pub fn from_group(protocol: impl Into<String>, port: u16, group_id: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            port,
            source_groups: vec![group_id.into()],
            source_cidrs: Vec::new(),
        }
    }

    /// Rule admitting traffic from an address range
    pub fn from_cidr(protocol: impl Into<String>, port: u16, cidr: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            port,
            source_groups: Vec::new(),
            source_cidrs: vec![cidr.into()],
        }
    }

    pub fn matches_port(&self, protocol: &str, port: u16) -> bool {
        self.port == port && self.protocol.eq_ignore_ascii_case(protocol)
    }
}

/// Access-control group (security group / firewall tag)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSecurityGroup {
    pub id: String,
    pub name: String,
    pub network_id: String,
    #[serde(default)]
    pub rules: Vec<NativeRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeInstance {
    pub id: String,
    pub state: String,
    pub zone: String,
    pub subnet_id: String,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub launched_at: Option<DateTime<Utc>>,
}

/// Scaling group (auto scaling group / managed instance group)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeScalingGroup {
    pub name: String,
    pub launch_template_id: String,
    pub subnet_ids: Vec<String>,
    pub desired_capacity: u32,
    #[serde(default)]
    pub instances: Vec<NativeInstance>,
    /// Set while a deletion is in progress
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeImage {
    pub id: String,
    pub name: String,
    pub state: String,
}

impl NativeImage {
    pub fn is_available(&self) -> bool {
        self.state == "available"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTemplateSpec {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub security_group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingGroupSpec {
    pub name: String,
    pub launch_template_id: String,
    pub subnet_ids: Vec<String>,
    pub desired_capacity: u32,
}

/// Capability consumed from a cloud provider
///
/// Every method maps onto one provider API call. Implementations report
/// missing objects as [`DriverErrorKind::NotFound`]; the topology core treats
/// that kind as "not visible yet" while waiting for convergence.
///
/// Describe calls on eventually consistent providers may lag behind
/// mutations. Callers wait rather than assume read-after-write.
#[async_trait]
pub trait CloudDriver: Send + Sync {
    /// Provider this driver talks to
    fn provider(&self) -> CloudProvider;

    /// Availability zones of `region`, in provider order
    async fn describe_availability_zones(&self, region: &str) -> DriverResult<Vec<String>>;

    /// Look up an image by name
    ///
    /// # Errors
    /// - `NotFound` if no image has that name
    async fn describe_image(&self, name: &str) -> DriverResult<NativeImage>;

    /// Create a network and return its id
    async fn create_network(&self, cidr: &str, region: &str) -> DriverResult<String>;

    /// Add or overwrite tags on a network
    async fn tag_network(&self, network_id: &str, tags: &Tags) -> DriverResult<()>;

    async fn describe_networks(&self) -> DriverResult<Vec<NativeNetwork>>;

    /// # Errors
    /// - `DependencyViolation` while subnets or groups remain in the network
    async fn delete_network(&self, network_id: &str) -> DriverResult<()>;

    /// Create a subnet and return its id
    ///
    /// # Errors
    /// - `InvalidParameter` if the block is outside the network or overlaps a sibling
    async fn create_subnet(
        &self,
        network_id: &str,
        cidr: &str,
        zone: &str,
        tags: &Tags,
    ) -> DriverResult<String>;

    async fn describe_subnets(&self, network_id: &str) -> DriverResult<Vec<NativeSubnet>>;

    /// # Errors
    /// - `DependencyViolation` while live instances remain in the subnet
    async fn delete_subnet(&self, subnet_id: &str) -> DriverResult<()>;

    /// Create an access-control group and return its id
    async fn create_security_group(&self, network_id: &str, name: &str) -> DriverResult<String>;

    /// Groups in one network, or in every network when `network_id` is `None`
    async fn describe_security_groups(
        &self,
        network_id: Option<&str>,
    ) -> DriverResult<Vec<NativeSecurityGroup>>;

    /// # Errors
    /// - `Duplicate` if an identical permission already exists
    async fn authorize_ingress(&self, group_id: &str, rule: &NativeRule) -> DriverResult<()>;

    /// # Errors
    /// - `NotFound` if no identical permission exists
    async fn revoke_ingress(&self, group_id: &str, rule: &NativeRule) -> DriverResult<()>;

    /// # Errors
    /// - `DependencyViolation` while a launch template references the group
    async fn delete_security_group(&self, group_id: &str) -> DriverResult<()>;

    /// Create a launch template and return its id
    async fn create_launch_template(&self, spec: &LaunchTemplateSpec) -> DriverResult<String>;

    /// # Errors
    /// - `DependencyViolation` while a scaling group references the template
    async fn delete_launch_template(&self, template_id: &str) -> DriverResult<()>;

    async fn create_scaling_group(&self, spec: &ScalingGroupSpec) -> DriverResult<()>;

    /// Scaling groups with the given names; unknown names are omitted
    async fn describe_scaling_groups(&self, names: &[String])
        -> DriverResult<Vec<NativeScalingGroup>>;

    async fn set_desired_capacity(&self, name: &str, capacity: u32) -> DriverResult<()>;

    /// # Errors
    /// - `DependencyViolation` while any instance is not terminated
    async fn delete_scaling_group(&self, name: &str) -> DriverResult<()>;
}
