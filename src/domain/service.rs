// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service and Instance Entities
//!
//! A [`Service`] is the unit of connectivity policy: a named group of
//! instances inside one network, backed by one scaling group and one
//! access-control group at the provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use super::network::Subnetwork;

/// Instance lifecycle state as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    /// Termination requested, not yet complete
    ShuttingDown,
    /// Terminal
    Terminated,
}

impl InstanceState {
    /// Provider wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        }
    }

    /// Instance is serving traffic
    pub fn is_in_service(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "shutting-down" => Ok(Self::ShuttingDown),
            "terminated" => Ok(Self::Terminated),
            other => Err(format!("unknown instance state: {}", other)),
        }
    }
}

/// Compute instance belonging to a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_address: Option<Ipv4Addr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_address: Option<Ipv4Addr>,

    pub state: InstanceState,

    pub zone: String,

    /// Subnetwork the instance was launched into
    pub subnet_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub launched_at: Option<DateTime<Utc>>,
}

/// Named group of instances scoped to one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,

    /// Name of the owning network
    pub network: String,

    pub network_id: String,

    /// Access-control group all of this service's ingress rules live on
    pub security_group_id: String,

    /// Provider scaling group name
    pub scaling_group: String,

    /// Subnetworks ordered by zone
    pub subnetworks: Vec<Subnetwork>,
}

impl Service {
    /// All instances across every subnetwork
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.subnetworks.iter().flat_map(|s| s.instances.iter())
    }

    /// Instances currently in service
    pub fn running_instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances().filter(|i| i.state.is_in_service())
    }

    pub fn zones(&self) -> Vec<&str> {
        self.subnetworks.iter().map(|s| s.zone.as_str()).collect()
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances().find(|i| i.id == id)
    }
}
