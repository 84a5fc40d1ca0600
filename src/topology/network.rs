// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network lifecycle

use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use super::blueprint::NetworkBlueprint;
use super::TopologyClient;
use crate::cidr;
use crate::domain::invariants::{validate_disjoint, validate_name, validate_network_destroyable};
use crate::domain::{CidrBlock, Network};
use crate::driver::{canonical, Tags, NAME_TAG};
use crate::errors::{TopologyError, TopologyResult};

/// Network operations bound to a [`TopologyClient`]
#[derive(Debug, Clone, Copy)]
pub struct NetworkManager<'a> {
    client: &'a TopologyClient,
}

impl<'a> NetworkManager<'a> {
    pub(crate) fn new(client: &'a TopologyClient) -> Self {
        Self { client }
    }

    /// Every named network, ordered by name
    ///
    /// # Errors
    /// - `BadEnvironmentState` if two networks carry the same name
    pub async fn list(&self) -> TopologyResult<Vec<Network>> {
        let natives = self.client.driver().describe_networks().await?;

        let mut by_name: BTreeMap<String, Network> = BTreeMap::new();
        for native in &natives {
            let Some(network) = canonical::network(native)? else {
                continue;
            };
            if let Some(existing) = by_name.get(&network.name) {
                return Err(TopologyError::BadEnvironmentState(format!(
                    "networks {} and {} are both named {}",
                    existing.id, network.id, network.name
                )));
            }
            by_name.insert(network.name.clone(), network);
        }

        Ok(by_name.into_values().collect())
    }

    pub async fn get(&self, name: &str) -> TopologyResult<Option<Network>> {
        Ok(self.list().await?.into_iter().find(|n| n.name == name))
    }

    /// # Errors
    /// - `NotFound` if no network has that name
    pub async fn require(&self, name: &str) -> TopologyResult<Network> {
        self.get(name)
            .await?
            .ok_or_else(|| TopologyError::NotFound(format!("network {}", name)))
    }

    /// Create a network with a block allocated from the blueprint's parent
    ///
    /// The block avoids every existing network's block, named or not.
    ///
    /// # Errors
    /// - `DisallowedOperation` if the name is taken or invalid
    /// - `NotEnoughAddressSpace` if the parent has no free block left
    /// - `OperationTimedOut` if the network or its name tag never shows up;
    ///   the network is deleted again first
    pub async fn create(
        &self,
        name: &str,
        blueprint: &dyn NetworkBlueprint,
    ) -> TopologyResult<Network> {
        validate_name(name)?;
        self.ensure_absent(name).await?;

        let existing = self.existing_blocks().await?;
        let block = cidr::allocate(
            &blueprint.parent_block(),
            &existing,
            blueprint.prefix_len(),
            1,
        )?
        .remove(0);
        debug!("Allocated {} for network {}", block, name);

        self.provision(name, block).await
    }

    /// Create a network with a caller-chosen block
    ///
    /// # Errors
    /// - `DisallowedOperation` if the name is taken or the block overlaps an existing network
    pub async fn create_with_block(&self, name: &str, block: CidrBlock) -> TopologyResult<Network> {
        validate_name(name)?;
        self.ensure_absent(name).await?;
        validate_disjoint(&block, &self.existing_blocks().await?)?;

        self.provision(name, block).await
    }

    /// # Errors
    /// - `NotFound` if no network has that name
    /// - `DisallowedOperation` while any subnetwork remains
    pub async fn destroy(&self, name: &str) -> TopologyResult<()> {
        let network = self.require(name).await?;
        let subnets = self.client.driver().describe_subnets(&network.id).await?;
        validate_network_destroyable(name, subnets.len())?;

        self.client.driver().delete_network(&network.id).await?;
        info!("Destroyed network {} ({})", name, network.id);
        Ok(())
    }

    async fn ensure_absent(&self, name: &str) -> TopologyResult<()> {
        if self.get(name).await?.is_some() {
            return Err(TopologyError::DisallowedOperation(format!(
                "network {} already exists",
                name
            )));
        }
        Ok(())
    }

    async fn existing_blocks(&self) -> TopologyResult<Vec<CidrBlock>> {
        self.client
            .driver()
            .describe_networks()
            .await?
            .iter()
            .map(|n| canonical::cidr(&n.cidr, &n.id))
            .collect()
    }

    async fn provision(&self, name: &str, block: CidrBlock) -> TopologyResult<Network> {
        let driver = self.client.driver();
        let region = &self.client.config().region;

        let id = driver.create_network(&block.to_string(), region).await?;
        debug!("Network {} created as {}", name, id);

        if let Err(e) = self.name_network(&id, name).await {
            warn!("Rolling back network {} ({}): {}", name, id, e);
            if let Err(rollback) = driver.delete_network(&id).await {
                error!("Failed to delete network {} during rollback: {}", id, rollback);
            }
            return Err(e);
        }

        info!("Created network {} ({}) as {}", name, block, id);
        Ok(Network {
            id,
            name: name.to_string(),
            block,
            region: region.clone(),
        })
    }

    /// Wait for the network to be listed, tag it and wait for the tag
    async fn name_network(&self, id: &str, name: &str) -> TopologyResult<()> {
        let driver = self.client.driver();
        let policy = self.client.config().convergence.propagation;

        policy
            .until(&format!("network {} visible", id), || async move {
                let networks = driver.describe_networks().await?;
                Ok::<_, TopologyError>(networks.iter().any(|n| n.id == id))
            })
            .await?;

        let tags = Tags::from([(NAME_TAG.to_string(), name.to_string())]);
        driver.tag_network(id, &tags).await?;

        policy
            .until(&format!("network {} tagged {}", id, name), || async move {
                let networks = driver.describe_networks().await?;
                Ok::<_, TopologyError>(
                    networks
                        .iter()
                        .any(|n| n.id == id && canonical::network_name(n) == Some(name)),
                )
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConvergenceConfig, TopologyConfig};
    use crate::driver::{CloudDriver, CloudProvider, InMemoryDriver, SimulationSettings};
    use crate::topology::NetworkSpec;
    use std::sync::Arc;

    fn client(settings: SimulationSettings) -> (Arc<InMemoryDriver>, TopologyClient) {
        let driver = Arc::new(InMemoryDriver::new(CloudProvider::Aws).with_settings(settings));
        let config = TopologyConfig::new(CloudProvider::Aws, "us-east-1")
            .with_convergence(ConvergenceConfig::immediate());
        let client = TopologyClient::new(config, driver.clone()).unwrap();
        (driver, client)
    }

    fn ten_slash_eight() -> NetworkSpec {
        NetworkSpec::new(CidrBlock::new("10.0.0.0/8").unwrap(), 16)
    }

    #[tokio::test]
    async fn test_networks_get_disjoint_blocks() {
        let (_, client) = client(SimulationSettings::default());
        let networks = client.networks();

        let n1 = networks.create("n1", &ten_slash_eight()).await.unwrap();
        let n2 = networks.create("n2", &ten_slash_eight()).await.unwrap();

        assert_eq!(n1.block.to_string(), "10.0.0.0/16");
        assert_eq!(n2.block.to_string(), "10.1.0.0/16");
        assert_eq!(networks.get("n2").await.unwrap(), Some(n2));
        let names: Vec<String> = networks.list().await.unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["n1", "n2"]);
    }

    #[tokio::test]
    async fn test_duplicate_and_overlapping_networks_are_rejected() {
        let (_, client) = client(SimulationSettings::instant());
        let networks = client.networks();
        networks
            .create_with_block("n1", CidrBlock::new("10.0.0.0/16").unwrap())
            .await
            .unwrap();

        assert!(matches!(
            networks.create("n1", &ten_slash_eight()).await,
            Err(TopologyError::DisallowedOperation(_))
        ));
        assert!(matches!(
            networks
                .create_with_block("n2", CidrBlock::new("10.0.128.0/17").unwrap())
                .await,
            Err(TopologyError::DisallowedOperation(_))
        ));
        assert!(matches!(
            networks.create("bad name", &ten_slash_eight()).await,
            Err(TopologyError::DisallowedOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_parent_exhaustion() {
        let (_, client) = client(SimulationSettings::instant());
        let spec = NetworkSpec::new(CidrBlock::new("10.0.0.0/15").unwrap(), 16);
        client.networks().create("n1", &spec).await.unwrap();
        client.networks().create("n2", &spec).await.unwrap();
        assert!(matches!(
            client.networks().create("n3", &spec).await,
            Err(TopologyError::NotEnoughAddressSpace { .. })
        ));
    }

    #[tokio::test]
    async fn test_untagged_network_is_rolled_back() {
        let (driver, client) = client(SimulationSettings {
            tag_visibility_polls: None,
            ..SimulationSettings::instant()
        });

        let result = client.networks().create("n1", &ten_slash_eight()).await;

        assert!(matches!(result, Err(TopologyError::OperationTimedOut { .. })));
        assert!(driver.describe_networks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_destroy() {
        let (_, client) = client(SimulationSettings::instant());
        client.networks().create("n1", &ten_slash_eight()).await.unwrap();

        client.networks().destroy("n1").await.unwrap();
        assert_eq!(client.networks().get("n1").await.unwrap(), None);
        assert!(matches!(
            client.networks().destroy("n1").await,
            Err(TopologyError::NotFound(_))
        ));
    }
}
