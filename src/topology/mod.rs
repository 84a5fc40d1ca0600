// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Manager
//!
//! Orchestrates network, subnetwork and service lifecycles against a
//! [`CloudDriver`], allocating address space with [`crate::cidr`] and waiting
//! out provider lag with [`crate::convergence`].
//!
//! # Ordering
//!
//! ```text
//! create:   Network ─▶ Subnetworks ─▶ Group ─▶ Template ─▶ Scaling group ─▶ Instances
//! destroy:  Instances ─▶ Scaling group ─▶ Template ─▶ Group ─▶ Subnetworks ─▶ (Network)
//! ```
//!
//! A network with live subnetworks cannot be destroyed.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cim_topology::{
//!     CloudProvider, ConvergenceConfig, InMemoryDriver, NetworkSpec, ServiceSpec,
//!     TopologyClient, TopologyConfig,
//! };
//! use cim_topology::domain::{CidrBlock, Endpoint};
//!
//! # tokio_test::block_on(async {
//! let driver = InMemoryDriver::new(CloudProvider::Aws);
//! driver.register_image("base");
//!
//! let config = TopologyConfig::new(CloudProvider::Aws, "us-east-1")
//!     .with_convergence(ConvergenceConfig::immediate());
//! let client = TopologyClient::new(config, Arc::new(driver)).unwrap();
//!
//! let parent = CidrBlock::new("10.0.0.0/8").unwrap();
//! client.networks().create("n1", &NetworkSpec::new(parent, 16)).await.unwrap();
//! let web = client.services().create("n1", "web", &ServiceSpec::new("base")).await.unwrap();
//!
//! client.paths().add(Endpoint::anywhere(), &web, 443).await.unwrap();
//! assert!(client.paths().internet_accessible(&web, 443).await.unwrap());
//! # });
//! ```

use std::fmt;
use std::sync::Arc;

use crate::config::TopologyConfig;
use crate::driver::CloudDriver;
use crate::errors::{TopologyError, TopologyResult};
use crate::paths::PathCompiler;

pub mod blueprint;
pub mod network;
pub mod service;

pub use blueprint::{NetworkBlueprint, NetworkSpec, ServiceBlueprint, ServiceSpec};
pub use network::NetworkManager;
pub use service::ServiceManager;

/// Caller-owned handle to one provider region
///
/// Holds only configuration and the driver; every operation reads the
/// provider afresh. Cloning is cheap and shares the driver.
#[derive(Clone)]
pub struct TopologyClient {
    config: Arc<TopologyConfig>,
    driver: Arc<dyn CloudDriver>,
}

impl TopologyClient {
    /// # Errors
    /// - `Configuration` if the driver talks to a different provider than
    ///   configured, the region is empty or a wait policy allows zero attempts
    pub fn new(config: TopologyConfig, driver: Arc<dyn CloudDriver>) -> TopologyResult<Self> {
        if driver.provider() != config.provider {
            return Err(TopologyError::Configuration(format!(
                "configured for {} but the driver talks to {}",
                config.provider,
                driver.provider()
            )));
        }
        if config.region.trim().is_empty() {
            return Err(TopologyError::Configuration("region must not be empty".to_string()));
        }
        config.convergence.validate()?;

        Ok(Self {
            config: Arc::new(config),
            driver,
        })
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn driver(&self) -> &dyn CloudDriver {
        self.driver.as_ref()
    }

    pub fn networks(&self) -> NetworkManager<'_> {
        NetworkManager::new(self)
    }

    pub fn services(&self) -> ServiceManager<'_> {
        ServiceManager::new(self)
    }

    pub fn paths(&self) -> PathCompiler<'_> {
        PathCompiler::new(self)
    }
}

impl fmt::Debug for TopologyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyClient")
            .field("provider", &self.config.provider)
            .field("region", &self.config.region)
            .finish_non_exhaustive()
    }
}
