// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service lifecycle
//!
//! A service is discovered through its access-control group: the group is
//! named after the service and lives in the network's scope. Subnets carry a
//! service tag; the scaling group is named after the network id and the
//! service name.

use tracing::{debug, error, info, warn};

use super::blueprint::ServiceBlueprint;
use super::TopologyClient;
use crate::cidr;
use crate::domain::invariants::validate_name;
use crate::domain::{CidrBlock, Instance, Network, Service};
use crate::driver::{
    canonical, LaunchTemplateSpec, NativeScalingGroup, NativeSecurityGroup, ScalingGroupSpec,
    Tags, NAME_TAG, SERVICE_TAG,
};
use crate::errors::{TopologyError, TopologyResult};
use crate::state_machine::instance_lifecycle::step_towards_service;

/// Service operations bound to a [`TopologyClient`]
#[derive(Debug, Clone, Copy)]
pub struct ServiceManager<'a> {
    client: &'a TopologyClient,
}

/// Resources a service create has made so far, released in reverse on failure
#[derive(Debug)]
struct Provisioned {
    group_id: String,
    subnet_ids: Vec<String>,
    template_id: Option<String>,
    scaling_group: bool,
}

/// Access-control group named `name`, if any
///
/// # Errors
/// - `BadEnvironmentState` if more than one group has that name
pub(crate) fn find_group<'g>(
    groups: &'g [NativeSecurityGroup],
    network: &Network,
    name: &str,
) -> TopologyResult<Option<&'g NativeSecurityGroup>> {
    let mut matching = groups
        .iter()
        .filter(|g| g.network_id == network.id && g.name == name);

    let found = matching.next();
    if let (Some(first), Some(second)) = (found, matching.next()) {
        return Err(TopologyError::BadEnvironmentState(format!(
            "groups {} and {} are both named {} in network {}",
            first.id, second.id, name, network.name
        )));
    }
    Ok(found)
}

impl<'a> ServiceManager<'a> {
    pub(crate) fn new(client: &'a TopologyClient) -> Self {
        Self { client }
    }

    /// Access-control group backing a service
    ///
    /// # Errors
    /// - `NotFound` if the network or the service does not exist
    pub(crate) async fn require_group(
        &self,
        network: &str,
        name: &str,
    ) -> TopologyResult<(Network, NativeSecurityGroup)> {
        let network = self.client.networks().require(network).await?;
        let groups = self
            .client
            .driver()
            .describe_security_groups(Some(&network.id))
            .await?;

        let group = find_group(&groups, &network, name)?
            .cloned()
            .ok_or_else(|| TopologyError::NotFound(format!("service {}/{}", network.name, name)))?;
        Ok((network, group))
    }

    /// Create a service and wait until all of its instances are in service
    ///
    /// # Errors
    /// - `NotFound` if the network does not exist
    /// - `DisallowedOperation` if the service exists, the name is invalid or
    ///   the region has fewer zones than requested
    /// - `NotEnoughAddressSpace` if the network cannot hold the subnets
    /// - `OperationTimedOut` if the image, subnets or instances never settle
    ///
    /// Once the access-control group exists, a failure releases everything
    /// created so far before the error is returned.
    pub async fn create(
        &self,
        network: &str,
        name: &str,
        blueprint: &dyn ServiceBlueprint,
    ) -> TopologyResult<Service> {
        validate_name(name)?;
        let network = self.client.networks().require(network).await?;
        let driver = self.client.driver();
        let convergence = self.client.config().convergence;

        let groups = driver.describe_security_groups(Some(&network.id)).await?;
        if find_group(&groups, &network, name)?.is_some() {
            return Err(TopologyError::DisallowedOperation(format!(
                "service {}/{} already exists",
                network.name, name
            )));
        }

        let image_name = blueprint.image_name();
        let image = convergence
            .image_available
            .for_value(&format!("image {} available", image_name), || async move {
                let image = driver.describe_image(image_name).await?;
                Ok::<_, TopologyError>(image.is_available().then_some(image))
            })
            .await?;

        let zones = self.zones(&network, blueprint.availability_zone_count()).await?;

        let existing = driver
            .describe_subnets(&network.id)
            .await?
            .iter()
            .map(|s| canonical::cidr(&s.cidr, &s.id))
            .collect::<TopologyResult<Vec<_>>>()?;
        let blocks = cidr::allocate(
            &network.block,
            &existing,
            blueprint.subnet_prefix_len(),
            zones.len(),
        )?;

        let placement: Vec<(&str, CidrBlock)> =
            zones.iter().map(String::as_str).zip(blocks).collect();
        let mut created = Provisioned {
            group_id: driver.create_security_group(&network.id, name).await?,
            subnet_ids: Vec::with_capacity(placement.len()),
            template_id: None,
            scaling_group: false,
        };
        if let Err(e) = self
            .provision(&network, name, blueprint, &image.id, &placement, &mut created)
            .await
        {
            warn!("Rolling back service {}/{}: {}", network.name, name, e);
            self.roll_back(&network, name, &created).await;
            return Err(e);
        }

        info!(
            "Created service {}/{} with {} instances in {} zones",
            network.name,
            name,
            blueprint.instance_count(),
            zones.len()
        );
        self.get(&network.name, name).await?.ok_or_else(|| {
            TopologyError::BadEnvironmentState(format!(
                "service {}/{} vanished after creation",
                network.name, name
            ))
        })
    }

    /// Subnets, launch template and scaling group of a new service, recorded
    /// in `created` as they are made
    async fn provision(
        &self,
        network: &Network,
        name: &str,
        blueprint: &dyn ServiceBlueprint,
        image_id: &str,
        placement: &[(&str, CidrBlock)],
        created: &mut Provisioned,
    ) -> TopologyResult<()> {
        let driver = self.client.driver();
        let convergence = self.client.config().convergence;

        for (zone, block) in placement {
            let tags = Tags::from([
                (NAME_TAG.to_string(), format!("{}-{}-{}", network.name, name, zone)),
                (SERVICE_TAG.to_string(), name.to_string()),
            ]);
            let id = driver
                .create_subnet(&network.id, &block.to_string(), zone, &tags)
                .await?;
            debug!("Created subnet {} ({}) for {}/{}", id, block, network.name, name);
            created.subnet_ids.push(id);
        }

        let network_id = network.id.as_str();
        let expected = created.subnet_ids.as_slice();
        convergence
            .propagation
            .until(&format!("subnets of {}/{} visible", network.name, name), || async move {
                let visible = driver.describe_subnets(network_id).await?;
                Ok::<_, TopologyError>(
                    expected
                        .iter()
                        .all(|id| visible.iter().any(|s| &s.id == id)),
                )
            })
            .await?;

        let scaling_group = canonical::scaling_group_name(network, name);
        let template_id = driver
            .create_launch_template(&LaunchTemplateSpec {
                name: scaling_group.clone(),
                image_id: image_id.to_string(),
                instance_type: blueprint.instance_type().to_string(),
                security_group_id: created.group_id.clone(),
            })
            .await?;
        created.template_id = Some(template_id.clone());

        let desired = blueprint.instance_count();
        driver
            .create_scaling_group(&ScalingGroupSpec {
                name: scaling_group.clone(),
                launch_template_id: template_id,
                subnet_ids: created.subnet_ids.clone(),
                desired_capacity: desired,
            })
            .await?;
        created.scaling_group = true;
        debug!(
            "Scaling group {} created with {} instances",
            scaling_group, desired
        );

        let names = [scaling_group.clone()];
        let names = names.as_slice();
        convergence
            .instance_in_service
            .until(&format!("instances of {} in service", scaling_group), || async move {
                let groups = driver.describe_scaling_groups(names).await?;
                all_in_service(groups.first(), desired)
            })
            .await
    }

    /// Best-effort release of a failed create; failures are logged
    async fn roll_back(&self, network: &Network, name: &str, created: &Provisioned) {
        let driver = self.client.driver();

        if created.scaling_group {
            if let Err(e) = self.release_scaling_group(network, name).await {
                error!(
                    "Failed to release scaling group of {}/{} during rollback: {}",
                    network.name, name, e
                );
            }
        } else if let Some(template_id) = &created.template_id {
            if let Err(e) = driver.delete_launch_template(template_id).await {
                error!(
                    "Failed to delete launch template {} during rollback: {}",
                    template_id, e
                );
            }
        }

        if let Err(e) = driver.delete_security_group(&created.group_id).await {
            error!(
                "Failed to delete security group {} during rollback: {}",
                created.group_id, e
            );
        }
        for subnet_id in &created.subnet_ids {
            if let Err(e) = driver.delete_subnet(subnet_id).await {
                error!("Failed to delete subnet {} during rollback: {}", subnet_id, e);
            }
        }
        if let Err(e) = self.await_subnets_deleted(network, name, &created.subnet_ids).await {
            error!("Subnets of {}/{} still listed after rollback: {}", network.name, name, e);
        }
    }

    /// # Errors
    /// - `NotFound` if the network does not exist
    pub async fn get(&self, network: &str, name: &str) -> TopologyResult<Option<Service>> {
        let network = self.client.networks().require(network).await?;
        let driver = self.client.driver();

        let groups = driver.describe_security_groups(Some(&network.id)).await?;
        let Some(group) = find_group(&groups, &network, name)? else {
            return Ok(None);
        };

        let subnets = driver.describe_subnets(&network.id).await?;
        let scaling_groups = driver
            .describe_scaling_groups(&[canonical::scaling_group_name(&network, name)])
            .await?;

        canonical::service(&network, group, &subnets, scaling_groups.first()).map(Some)
    }

    /// Every service in a network, ordered by name
    ///
    /// # Errors
    /// - `NotFound` if the network does not exist
    pub async fn list(&self, network: &str) -> TopologyResult<Vec<Service>> {
        let network = self.client.networks().require(network).await?;
        self.list_in(&network).await
    }

    /// Every service in every network
    pub async fn list_all(&self) -> TopologyResult<Vec<Service>> {
        let mut services = Vec::new();
        for network in self.client.networks().list().await? {
            services.extend(self.list_in(&network).await?);
        }
        Ok(services)
    }

    async fn list_in(&self, network: &Network) -> TopologyResult<Vec<Service>> {
        let driver = self.client.driver();

        let mut groups = driver.describe_security_groups(Some(&network.id)).await?;
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = groups.windows(2).find(|pair| pair[0].name == pair[1].name) {
            return Err(TopologyError::BadEnvironmentState(format!(
                "groups {} and {} are both named {} in network {}",
                pair[0].id, pair[1].id, pair[0].name, network.name
            )));
        }

        let subnets = driver.describe_subnets(&network.id).await?;
        let names: Vec<String> = groups
            .iter()
            .map(|g| canonical::scaling_group_name(network, &g.name))
            .collect();
        let scaling_groups = driver.describe_scaling_groups(&names).await?;

        groups
            .iter()
            .map(|group| {
                let asg_name = canonical::scaling_group_name(network, &group.name);
                let asg = scaling_groups.iter().find(|g| g.name == asg_name);
                canonical::service(network, group, &subnets, asg)
            })
            .collect()
    }

    /// One instance of a service
    ///
    /// # Errors
    /// - `NotFound` if the network or the service does not exist
    pub async fn get_instance(
        &self,
        network: &str,
        service: &str,
        instance_id: &str,
    ) -> TopologyResult<Option<Instance>> {
        let service = self
            .get(network, service)
            .await?
            .ok_or_else(|| TopologyError::NotFound(format!("service {}/{}", network, service)))?;
        Ok(service.instance(instance_id).cloned())
    }

    /// Wait until one instance of a service is in service
    ///
    /// # Errors
    /// - `NotFound` if the network, the service or the instance does not exist
    /// - `DisallowedOperation` if the instance is shutting down or terminated
    /// - `OperationTimedOut` if it does not reach service in time
    pub async fn wait_for_instance(
        &self,
        network: &str,
        service: &str,
        instance_id: &str,
    ) -> TopologyResult<Instance> {
        let this = *self;
        self.client
            .config()
            .convergence
            .instance_in_service
            .for_value(&format!("instance {} in service", instance_id), || async move {
                this.instance_in_service(network, service, instance_id).await
            })
            .await
    }

    /// The instance once it is in service, `None` while it is on its way
    async fn instance_in_service(
        &self,
        network: &str,
        service: &str,
        instance_id: &str,
    ) -> TopologyResult<Option<Instance>> {
        let instance = self
            .get_instance(network, service, instance_id)
            .await?
            .ok_or_else(|| {
                TopologyError::NotFound(format!(
                    "instance {} of {}/{}",
                    instance_id, network, service
                ))
            })?;

        if instance.state.is_in_service() {
            return Ok(Some(instance));
        }
        match step_towards_service(instance.state) {
            Some(step) => {
                debug!("Instance {} is {}, next {:?}", instance_id, instance.state, step);
                Ok(None)
            }
            None => Err(TopologyError::DisallowedOperation(format!(
                "instance {} is {} and will not return to service",
                instance_id, instance.state
            ))),
        }
    }

    /// Tear a service down
    ///
    /// Scales to zero, waits for every instance to terminate, deletes the
    /// scaling group and waits for it to go, then deletes the launch
    /// template, the access-control group and the subnets, waiting for the
    /// subnets to disappear. Rules in other groups that reference this
    /// service are left in place.
    ///
    /// # Errors
    /// - `NotFound` if the network or the service does not exist
    pub async fn destroy(&self, network: &str, name: &str) -> TopologyResult<()> {
        let (network, group) = self.require_group(network, name).await?;
        let driver = self.client.driver();

        self.release_scaling_group(&network, name).await?;
        driver.delete_security_group(&group.id).await?;

        let owned: Vec<String> = driver
            .describe_subnets(&network.id)
            .await?
            .into_iter()
            .filter(|s| canonical::belongs_to_service(s, name))
            .map(|s| s.id)
            .collect();
        for subnet_id in &owned {
            driver.delete_subnet(subnet_id).await?;
        }
        self.await_subnets_deleted(&network, name, &owned).await?;

        info!("Destroyed service {}/{}", network.name, name);
        Ok(())
    }

    /// Scale the service's scaling group to zero, delete it and its launch
    /// template; a missing scaling group is not an error
    async fn release_scaling_group(&self, network: &Network, name: &str) -> TopologyResult<()> {
        let driver = self.client.driver();
        let convergence = self.client.config().convergence;

        let scaling_group = canonical::scaling_group_name(network, name);
        let names = [scaling_group.clone()];
        let names = names.as_slice();

        let Some(asg) = driver.describe_scaling_groups(names).await?.into_iter().next() else {
            return Ok(());
        };

        driver.set_desired_capacity(&scaling_group, 0).await?;
        convergence
            .instance_termination
            .until(&format!("instances of {} terminated", scaling_group), || async move {
                let groups = driver.describe_scaling_groups(names).await?;
                all_terminated(groups.first())
            })
            .await?;

        driver.delete_scaling_group(&scaling_group).await?;
        convergence
            .scaling_group_deletion
            .until(&format!("scaling group {} deleted", scaling_group), || async move {
                let groups = driver.describe_scaling_groups(names).await?;
                Ok::<_, TopologyError>(groups.is_empty())
            })
            .await?;

        driver.delete_launch_template(&asg.launch_template_id).await?;
        debug!("Deleted scaling group {} and its template", scaling_group);
        Ok(())
    }

    async fn await_subnets_deleted(
        &self,
        network: &Network,
        name: &str,
        subnet_ids: &[String],
    ) -> TopologyResult<()> {
        let driver = self.client.driver();
        let network_id = network.id.as_str();
        self.client
            .config()
            .convergence
            .propagation
            .until(&format!("subnets of {}/{} deleted", network.name, name), || async move {
                let remaining = driver.describe_subnets(network_id).await?;
                Ok::<_, TopologyError>(!remaining.iter().any(|s| subnet_ids.contains(&s.id)))
            })
            .await
    }

    /// Zones to place subnets in: the region itself for regional subnets,
    /// otherwise the first `count` availability zones
    async fn zones(&self, network: &Network, count: usize) -> TopologyResult<Vec<String>> {
        if self.client.driver().provider().has_regional_subnets() {
            return Ok(vec![network.region.clone()]);
        }

        if count == 0 {
            return Err(TopologyError::DisallowedOperation(
                "a service needs at least one availability zone".to_string(),
            ));
        }

        let available = self
            .client
            .driver()
            .describe_availability_zones(&network.region)
            .await?;
        if available.len() < count {
            return Err(TopologyError::DisallowedOperation(format!(
                "region {} has {} availability zones, {} requested",
                network.region,
                available.len(),
                count
            )));
        }
        Ok(available.into_iter().take(count).collect())
    }
}

/// Scaling group reports `desired` live instances, all in service
fn all_in_service(group: Option<&NativeScalingGroup>, desired: u32) -> TopologyResult<bool> {
    let Some(group) = group else {
        return Ok(false);
    };

    let mut live = 0;
    for instance in &group.instances {
        let state = canonical::instance_state(&instance.state, &instance.id)?;
        if state.is_terminated() {
            continue;
        }
        if !state.is_in_service() {
            return Ok(false);
        }
        live += 1;
    }
    Ok(live == desired)
}

/// Scaling group is gone or every instance in it is terminated
fn all_terminated(group: Option<&NativeScalingGroup>) -> TopologyResult<bool> {
    let Some(group) = group else {
        return Ok(true);
    };

    for instance in &group.instances {
        if !canonical::instance_state(&instance.state, &instance.id)?.is_terminated() {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConvergenceConfig, TopologyConfig};
    use crate::domain::{CidrBlock, InstanceState};
    use crate::driver::{CloudProvider, InMemoryDriver, NativeInstance};
    use crate::topology::ServiceSpec;
    use std::sync::Arc;

    async fn client_with_network(provider: CloudProvider, region: &str) -> TopologyClient {
        let driver = InMemoryDriver::new(provider);
        driver.register_image("base");
        let config =
            TopologyConfig::new(provider, region).with_convergence(ConvergenceConfig::immediate());
        let client = TopologyClient::new(config, Arc::new(driver)).unwrap();
        client
            .networks()
            .create_with_block("n1", CidrBlock::new("10.0.0.0/16").unwrap())
            .await
            .unwrap();
        client
    }

    fn native(state: &str) -> NativeInstance {
        NativeInstance {
            id: "i-1".to_string(),
            state: state.to_string(),
            zone: "us-east-1a".to_string(),
            subnet_id: "subnet-1".to_string(),
            private_ip: None,
            public_ip: None,
            launched_at: None,
        }
    }

    fn group(states: &[&str]) -> NativeScalingGroup {
        NativeScalingGroup {
            name: "asg".to_string(),
            launch_template_id: "lt-1".to_string(),
            subnet_ids: vec!["subnet-1".to_string()],
            desired_capacity: states.len() as u32,
            instances: states.iter().map(|s| native(s)).collect(),
            status: None,
        }
    }

    #[test]
    fn test_convergence_predicates() {
        assert!(!all_in_service(None, 1).unwrap());
        assert!(all_in_service(Some(&group(&["running", "terminated"])), 1).unwrap());
        assert!(!all_in_service(Some(&group(&["running", "pending"])), 2).unwrap());
        assert!(!all_in_service(Some(&group(&["running"])), 2).unwrap());

        assert!(all_terminated(None).unwrap());
        assert!(all_terminated(Some(&group(&["terminated"]))).unwrap());
        assert!(!all_terminated(Some(&group(&["shutting-down"]))).unwrap());
        assert!(all_terminated(Some(&group(&["rebooting"]))).is_err());
    }

    #[tokio::test]
    async fn test_create_spreads_subnets_over_zones() {
        let client = client_with_network(CloudProvider::Aws, "us-east-1").await;
        let spec = ServiceSpec::new("base").with_instances(3);

        let web = client.services().create("n1", "web", &spec).await.unwrap();

        let cidrs: Vec<String> = web.subnetworks.iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(cidrs, vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]);
        assert_eq!(web.zones(), vec!["us-east-1a", "us-east-1b", "us-east-1c"]);
        assert_eq!(web.running_instances().count(), 3);
        for subnet in &web.subnetworks {
            assert_eq!(subnet.instances.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_second_service_avoids_first_services_subnets() {
        let client = client_with_network(CloudProvider::Aws, "us-east-1").await;
        let services = client.services();
        services
            .create("n1", "web", &ServiceSpec::new("base").with_zones(2))
            .await
            .unwrap();
        let db = services
            .create("n1", "db", &ServiceSpec::new("base").with_zones(1).with_subnet_prefix_len(20))
            .await
            .unwrap();

        assert_eq!(db.subnetworks[0].cidr.to_string(), "10.0.16.0/20");
        let names: Vec<String> = services.list("n1").await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["db", "web"]);
        assert_eq!(services.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gce_service_has_one_regional_subnet() {
        let client = client_with_network(CloudProvider::Gce, "us-central1").await;
        let web = client
            .services()
            .create("n1", "web", &ServiceSpec::new("base").with_instances(2))
            .await
            .unwrap();

        assert_eq!(web.subnetworks.len(), 1);
        assert_eq!(web.subnetworks[0].zone, "us-central1");
        let zones: Vec<&str> = web.instances().map(|i| i.zone.as_str()).collect();
        assert!(zones.iter().all(|z| z.starts_with("us-central1-")));
    }

    #[tokio::test]
    async fn test_create_errors() {
        let client = client_with_network(CloudProvider::Aws, "us-east-1").await;
        let services = client.services();

        assert!(matches!(
            services.create("n9", "web", &ServiceSpec::new("base")).await,
            Err(TopologyError::NotFound(_))
        ));
        assert!(matches!(
            services.create("n1", "web", &ServiceSpec::new("base").with_zones(4)).await,
            Err(TopologyError::DisallowedOperation(_))
        ));
        assert!(matches!(
            services.create("n1", "web", &ServiceSpec::new("missing")).await,
            Err(TopologyError::OperationTimedOut { .. })
        ));

        services
            .create("n1", "web", &ServiceSpec::new("base"))
            .await
            .unwrap();
        assert!(matches!(
            services.create("n1", "web", &ServiceSpec::new("base")).await,
            Err(TopologyError::DisallowedOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_instance() {
        let client = client_with_network(CloudProvider::Aws, "us-east-1").await;
        let web = client
            .services()
            .create("n1", "web", &ServiceSpec::new("base").with_zones(1))
            .await
            .unwrap();
        let id = web.instances().next().unwrap().id.clone();

        let instance = client
            .services()
            .get_instance("n1", "web", &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.state, InstanceState::Running);
        assert_eq!(instance.private_address.map(|a| a.to_string()).as_deref(), Some("10.0.0.4"));
        assert_eq!(
            client.services().get_instance("n1", "web", "i-none").await.unwrap(),
            None
        );
        assert!(matches!(
            client.services().get_instance("n1", "api", &id).await,
            Err(TopologyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_frees_network() {
        let client = client_with_network(CloudProvider::Aws, "us-east-1").await;
        client
            .services()
            .create("n1", "web", &ServiceSpec::new("base").with_instances(2))
            .await
            .unwrap();

        assert!(matches!(
            client.networks().destroy("n1").await,
            Err(TopologyError::DisallowedOperation(_))
        ));

        client.services().destroy("n1", "web").await.unwrap();
        assert_eq!(client.services().get("n1", "web").await.unwrap(), None);
        assert!(matches!(
            client.services().destroy("n1", "web").await,
            Err(TopologyError::NotFound(_))
        ));

        client.networks().destroy("n1").await.unwrap();
    }
}
