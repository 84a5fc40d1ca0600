// Copyright (c) 2025 - Cowboy AI, Inc.
//! Client configuration
//!
//! Which provider the client talks to, in which region, and how patiently it
//! waits for each kind of asynchronous provisioning step to settle.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::convergence::WaitPolicy;
use crate::driver::CloudProvider;
use crate::errors::{TopologyError, TopologyResult};

/// Environment variable selecting the provider (`aws` or `gce`)
pub const PROVIDER_ENV: &str = "CIM_TOPOLOGY_PROVIDER";

/// Environment variable holding the region
pub const REGION_ENV: &str = "CIM_TOPOLOGY_REGION";

/// Configuration for a [`crate::TopologyClient`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Provider the driver must implement
    pub provider: CloudProvider,

    /// Region networks are created in
    pub region: String,

    #[serde(default)]
    pub convergence: ConvergenceConfig,
}

impl TopologyConfig {
    pub fn new(provider: CloudProvider, region: impl Into<String>) -> Self {
        Self {
            provider,
            region: region.into(),
            convergence: ConvergenceConfig::default(),
        }
    }

    pub fn with_convergence(mut self, convergence: ConvergenceConfig) -> Self {
        self.convergence = convergence;
        self
    }

    /// Load configuration from environment variables
    ///
    /// - `CIM_TOPOLOGY_PROVIDER`: `aws` (default) or `gce`
    /// - `CIM_TOPOLOGY_REGION`: required
    pub fn from_env() -> TopologyResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> TopologyResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = match lookup(PROVIDER_ENV) {
            Some(value) => value.parse::<CloudProvider>().map_err(|e| {
                TopologyError::Configuration(format!("{}: {}", PROVIDER_ENV, e))
            })?,
            None => CloudProvider::Aws,
        };

        let region = lookup(REGION_ENV)
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| TopologyError::Configuration(format!("{} not set", REGION_ENV)))?;

        Ok(Self::new(provider, region))
    }
}

/// One wait policy per kind of asynchronous provisioning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// New networks, subnets and tags becoming visible; subnets disappearing
    #[serde(default = "default_propagation")]
    pub propagation: WaitPolicy,

    /// Scaling group instances reaching "in service"
    #[serde(default = "default_instance_in_service")]
    pub instance_in_service: WaitPolicy,

    /// Scaling group instances reaching "terminated"
    #[serde(default = "default_instance_termination")]
    pub instance_termination: WaitPolicy,

    /// Deleted scaling group disappearing
    #[serde(default = "default_scaling_group_deletion")]
    pub scaling_group_deletion: WaitPolicy,

    /// Image reaching "available"
    #[serde(default = "default_image_available")]
    pub image_available: WaitPolicy,
}

fn default_propagation() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(2), 30)
}

fn default_instance_in_service() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(5), 60)
}

fn default_instance_termination() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(5), 60)
}

fn default_scaling_group_deletion() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(5), 60)
}

fn default_image_available() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(10), 90)
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            propagation: default_propagation(),
            instance_in_service: default_instance_in_service(),
            instance_termination: default_instance_termination(),
            scaling_group_deletion: default_scaling_group_deletion(),
            image_available: default_image_available(),
        }
    }
}

impl ConvergenceConfig {
    /// # Errors
    /// - `Configuration` if any policy allows zero attempts
    pub fn validate(&self) -> TopologyResult<()> {
        let policies = [
            ("propagation", self.propagation),
            ("instance_in_service", self.instance_in_service),
            ("instance_termination", self.instance_termination),
            ("scaling_group_deletion", self.scaling_group_deletion),
            ("image_available", self.image_available),
        ];
        match policies.iter().find(|(_, policy)| policy.max_attempts == 0) {
            Some((name, _)) => Err(TopologyError::Configuration(format!(
                "convergence.{}.max_attempts must be at least 1",
                name
            ))),
            None => Ok(()),
        }
    }

    /// Zero-interval policies, for the in-memory provider and tests
    pub fn immediate() -> Self {
        let policy = WaitPolicy::immediate(50);
        Self {
            propagation: policy,
            instance_in_service: policy,
            instance_termination: policy,
            scaling_group_deletion: policy,
            image_available: policy,
        }
    }
}
