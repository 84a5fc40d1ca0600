// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-topology
//!
//! Builds clients against the in-memory driver with an image registered and
//! convergence waits that never sleep, so every test runs in virtual time.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use cim_topology::domain::{CidrBlock, Service};
use cim_topology::{
    CloudProvider, ConvergenceConfig, InMemoryDriver, ServiceSpec, SimulationSettings,
    TopologyClient, TopologyConfig,
};

pub const IMAGE: &str = "base-image";
pub const AWS_REGION: &str = "us-east-1";
pub const GCE_REGION: &str = "us-central1";

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness; `RUST_LOG` filters it
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn region(provider: CloudProvider) -> &'static str {
    match provider {
        CloudProvider::Aws => AWS_REGION,
        CloudProvider::Gce => GCE_REGION,
    }
}

/// Client plus a handle on its driver for fault injection
pub fn client_with(
    provider: CloudProvider,
    settings: SimulationSettings,
) -> (Arc<InMemoryDriver>, TopologyClient) {
    init_tracing();

    let driver = Arc::new(InMemoryDriver::new(provider).with_settings(settings));
    driver.register_image(IMAGE);

    let config = TopologyConfig::new(provider, region(provider))
        .with_convergence(ConvergenceConfig::immediate());
    let client = TopologyClient::new(config, driver.clone()).expect("valid test configuration");
    (driver, client)
}

pub fn client(provider: CloudProvider) -> (Arc<InMemoryDriver>, TopologyClient) {
    client_with(provider, SimulationSettings::default())
}

pub fn block(cidr: &str) -> CidrBlock {
    CidrBlock::new(cidr).expect("valid test CIDR")
}

/// `n1` on 10.0.0.0/16
pub async fn with_network(client: &TopologyClient) {
    client
        .networks()
        .create_with_block("n1", block("10.0.0.0/16"))
        .await
        .expect("network n1");
}

/// Service in `n1` with one instance per zone over three zones
pub async fn service(client: &TopologyClient, name: &str) -> Service {
    client
        .services()
        .create("n1", name, &ServiceSpec::new(IMAGE).with_zones(3).with_instances(3))
        .await
        .expect("service created")
}
