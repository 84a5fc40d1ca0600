// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-Memory Cloud Provider
//!
//! A complete [`CloudDriver`] held in process memory. It reproduces the
//! provider behaviour the topology core has to cope with:
//!
//! - **Visibility lag**: new networks, subnets and network tags are missing
//!   from the first N describe calls after they are written
//! - **Asynchronous instances**: instances boot and terminate over several
//!   describe calls, driven by the instance lifecycle state machine
//! - **Deletion lag**: deleted scaling groups and subnets linger in listings
//! - **Conflicts**: overlapping subnets, duplicate rules and deleting
//!   resources that are still referenced are rejected
//! - **Fault injection**: [`InMemoryDriver::fail_next`] makes the next call
//!   of a named operation fail
//!
//! Every lag is counted in describe calls, not wall-clock time, so tests are
//! deterministic regardless of wait intervals.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use tracing::debug;
use uuid::Uuid;

use super::{
    CloudDriver, CloudProvider, DriverError, DriverResult, LaunchTemplateSpec, NativeImage,
    NativeInstance, NativeNetwork, NativeRule, NativeScalingGroup, NativeSecurityGroup,
    NativeSubnet, ScalingGroupSpec, Tags,
};
use crate::domain::invariants::validate_subnet_placement;
use crate::domain::{CidrBlock, InstanceState};
use crate::state_machine::instance_lifecycle::InstanceCommand;
use crate::state_machine::{StateMachineWithHistory, Transition};

/// Lag knobs, each counted in describe calls that do not yet observe a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub network_visibility_polls: u32,
    pub subnet_visibility_polls: u32,
    /// `None` means tags written to a network never become visible
    pub tag_visibility_polls: Option<u32>,
    pub subnet_deletion_polls: u32,
    pub instance_boot_polls: u32,
    pub instance_termination_polls: u32,
    pub scaling_group_deletion_polls: u32,
    pub image_pending_polls: u32,
    /// Availability zones per region
    pub zones_per_region: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            network_visibility_polls: 1,
            subnet_visibility_polls: 1,
            tag_visibility_polls: Some(1),
            subnet_deletion_polls: 1,
            instance_boot_polls: 2,
            instance_termination_polls: 2,
            scaling_group_deletion_polls: 1,
            image_pending_polls: 1,
            zones_per_region: 3,
        }
    }
}

impl SimulationSettings {
    /// Every change is visible on the next describe call
    pub fn instant() -> Self {
        Self {
            network_visibility_polls: 0,
            subnet_visibility_polls: 0,
            tag_visibility_polls: Some(0),
            subnet_deletion_polls: 0,
            instance_boot_polls: 0,
            instance_termination_polls: 0,
            scaling_group_deletion_polls: 0,
            image_pending_polls: 0,
            zones_per_region: 3,
        }
    }
}

/// Number of observations left before a pending change lands
#[derive(Debug, Clone, Copy)]
struct Countdown(u32);

impl Countdown {
    /// Record one observation; true once the change has landed
    fn tick(&mut self) -> bool {
        if self.0 == 0 {
            true
        } else {
            self.0 -= 1;
            false
        }
    }
}

#[derive(Debug)]
struct NetworkRecord {
    native: NativeNetwork,
    block: CidrBlock,
    visible_in: Countdown,
    pending_tags: Vec<(Tags, Option<Countdown>)>,
}

#[derive(Debug)]
struct SubnetRecord {
    native: NativeSubnet,
    block: CidrBlock,
    visible_in: Countdown,
    deleting: Option<Countdown>,
    hosts_assigned: u32,
}

#[derive(Debug)]
struct InstanceRecord {
    id: String,
    zone: String,
    subnet_id: String,
    private_ip: Option<Ipv4Addr>,
    lifecycle: StateMachineWithHistory<InstanceState>,
    progress: Countdown,
    launched_at: chrono::DateTime<Utc>,
}

impl InstanceRecord {
    fn state(&self) -> InstanceState {
        *self.lifecycle.current_state()
    }

    fn apply(&mut self, command: InstanceCommand) {
        if let Err(e) = self.lifecycle.transition_with_history(command, Utc::now()) {
            debug!("Instance {} ignored {:?}: {}", self.id, command, e);
        }
    }

    /// Advance a pending boot or termination by one observation
    fn observe(&mut self) {
        let command = match self.state() {
            InstanceState::Pending => InstanceCommand::Boot,
            InstanceState::ShuttingDown => InstanceCommand::Reap,
            _ => return,
        };
        if self.progress.tick() {
            self.apply(command);
        }
    }

    fn is_live(&self) -> bool {
        !matches!(
            self.state(),
            InstanceState::ShuttingDown | InstanceState::Terminated
        )
    }

    fn native(&self) -> NativeInstance {
        NativeInstance {
            id: self.id.clone(),
            state: self.state().as_str().to_string(),
            zone: self.zone.clone(),
            subnet_id: self.subnet_id.clone(),
            private_ip: self.private_ip.map(|ip| ip.to_string()),
            public_ip: None,
            launched_at: Some(self.launched_at),
        }
    }
}

#[derive(Debug)]
struct ScalingGroupRecord {
    spec: ScalingGroupSpec,
    instances: Vec<InstanceRecord>,
    launched: usize,
    deleting: Option<Countdown>,
}

#[derive(Debug)]
struct ImageRecord {
    native: NativeImage,
    pending: Countdown,
}

#[derive(Debug, Default)]
struct State {
    networks: Vec<NetworkRecord>,
    subnets: Vec<SubnetRecord>,
    groups: Vec<NativeSecurityGroup>,
    templates: Vec<(String, LaunchTemplateSpec)>,
    scaling_groups: Vec<ScalingGroupRecord>,
    images: Vec<ImageRecord>,
    faults: HashMap<String, VecDeque<DriverError>>,
}

impl State {
    fn take_fault(&mut self, operation: &str) -> DriverResult<()> {
        match self.faults.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => {
                debug!("Injected fault for {}: {}", operation, error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn network(&self, network_id: &str) -> DriverResult<&NetworkRecord> {
        self.networks
            .iter()
            .find(|n| n.native.id == network_id)
            .ok_or_else(|| DriverError::not_found(format!("network {} does not exist", network_id)))
    }

    fn group_mut(&mut self, group_id: &str) -> DriverResult<&mut NativeSecurityGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| DriverError::not_found(format!("security group {} does not exist", group_id)))
    }

    fn scaling_group_mut(&mut self, name: &str) -> DriverResult<&mut ScalingGroupRecord> {
        self.scaling_groups
            .iter_mut()
            .find(|g| g.spec.name == name)
            .ok_or_else(|| DriverError::not_found(format!("scaling group {} does not exist", name)))
    }
}

fn resource_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..12])
}

fn parse_block(cidr: &str) -> DriverResult<CidrBlock> {
    CidrBlock::new(cidr).map_err(|e| DriverError::invalid_parameter(e.to_string()))
}

/// In-process [`CloudDriver`]
///
/// # Examples
///
/// ```rust
/// use cim_topology::driver::{CloudDriver, CloudProvider, InMemoryDriver, SimulationSettings};
///
/// # tokio_test::block_on(async {
/// let driver = InMemoryDriver::new(CloudProvider::Aws).with_settings(SimulationSettings::instant());
/// let id = driver.create_network("10.0.0.0/16", "us-east-1").await.unwrap();
/// let networks = driver.describe_networks().await.unwrap();
/// assert_eq!(networks[0].id, id);
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryDriver {
    provider: CloudProvider,
    settings: SimulationSettings,
    state: Mutex<State>,
}

impl InMemoryDriver {
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            settings: SimulationSettings::default(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_settings(mut self, settings: SimulationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Register an image; it turns "available" after `image_pending_polls` describes
    pub fn register_image(&self, name: &str) -> String {
        let id = resource_id("ami");
        self.state.lock().images.push(ImageRecord {
            native: NativeImage {
                id: id.clone(),
                name: name.to_string(),
                state: "pending".to_string(),
            },
            pending: Countdown(self.settings.image_pending_polls),
        });
        id
    }

    /// Make the next call of `operation` (a [`CloudDriver`] method name) fail
    ///
    /// Faults queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, operation: &str, error: DriverError) {
        self.state
            .lock()
            .faults
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Lifecycle transitions an instance has gone through, oldest first
    pub fn instance_history(
        &self,
        instance_id: &str,
    ) -> Option<Vec<Transition<InstanceState, InstanceCommand>>> {
        let state = self.state.lock();
        state
            .scaling_groups
            .iter()
            .flat_map(|g| g.instances.iter())
            .find(|i| i.id == instance_id)
            .map(|i| i.lifecycle.get_history().to_vec())
    }

    fn zones(&self, region: &str) -> Vec<String> {
        let separator = match self.provider {
            CloudProvider::Aws => "",
            CloudProvider::Gce => "-",
        };
        (0..self.settings.zones_per_region)
            .map(|i| format!("{}{}{}", region, separator, (b'a' + (i % 26) as u8) as char))
            .collect()
    }

    fn launch(&self, state: &mut State, group_index: usize) -> DriverResult<()> {
        let group = &state.scaling_groups[group_index];
        let subnet_id = group.spec.subnet_ids[group.launched % group.spec.subnet_ids.len()].clone();
        let ordinal = group.launched;

        let subnet = state
            .subnets
            .iter_mut()
            .find(|s| s.native.id == subnet_id && s.deleting.is_none())
            .ok_or_else(|| DriverError::not_found(format!("subnet {} does not exist", subnet_id)))?;

        let offset = 4 + u64::from(subnet.hosts_assigned);
        let private_ip = (offset < subnet.block.size())
            .then(|| Ipv4Addr::from(subnet.block.first() + offset as u32));
        subnet.hosts_assigned += 1;

        let subnet_zone = subnet.native.zone.clone();
        let network_id = subnet.native.network_id.clone();
        let zone = match state.network(&network_id) {
            Ok(network) if subnet_zone == network.native.region => {
                let zones = self.zones(&network.native.region);
                zones
                    .get(ordinal % zones.len().max(1))
                    .cloned()
                    .unwrap_or(subnet_zone)
            }
            _ => subnet_zone,
        };

        let instance = InstanceRecord {
            id: resource_id("i"),
            zone,
            subnet_id,
            private_ip,
            lifecycle: StateMachineWithHistory::new(InstanceState::Pending),
            progress: Countdown(self.settings.instance_boot_polls),
            launched_at: Utc::now(),
        };
        debug!("Launched instance {} in {}", instance.id, instance.subnet_id);

        let group = &mut state.scaling_groups[group_index];
        group.instances.push(instance);
        group.launched += 1;
        Ok(())
    }
}

#[async_trait]
impl CloudDriver for InMemoryDriver {
    fn provider(&self) -> CloudProvider {
        self.provider
    }

    async fn describe_availability_zones(&self, region: &str) -> DriverResult<Vec<String>> {
        self.state.lock().take_fault("describe_availability_zones")?;
        Ok(self.zones(region))
    }

    async fn describe_image(&self, name: &str) -> DriverResult<NativeImage> {
        let mut state = self.state.lock();
        state.take_fault("describe_image")?;

        let image = state
            .images
            .iter_mut()
            .find(|i| i.native.name == name)
            .ok_or_else(|| DriverError::not_found(format!("image {} does not exist", name)))?;

        if image.pending.tick() {
            image.native.state = "available".to_string();
        }
        Ok(image.native.clone())
    }

    async fn create_network(&self, cidr: &str, region: &str) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.take_fault("create_network")?;

        let block = parse_block(cidr)?;
        let id = resource_id("vpc");
        state.networks.push(NetworkRecord {
            native: NativeNetwork {
                id: id.clone(),
                cidr: block.to_string(),
                region: region.to_string(),
                tags: Tags::new(),
            },
            block,
            visible_in: Countdown(self.settings.network_visibility_polls),
            pending_tags: Vec::new(),
        });
        debug!("Created network {} ({})", id, block);
        Ok(id)
    }

    async fn tag_network(&self, network_id: &str, tags: &Tags) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("tag_network")?;

        let lag = self.settings.tag_visibility_polls.map(Countdown);
        let network = state
            .networks
            .iter_mut()
            .find(|n| n.native.id == network_id)
            .ok_or_else(|| DriverError::not_found(format!("network {} does not exist", network_id)))?;
        network.pending_tags.push((tags.clone(), lag));
        Ok(())
    }

    async fn describe_networks(&self) -> DriverResult<Vec<NativeNetwork>> {
        let mut state = self.state.lock();
        state.take_fault("describe_networks")?;

        let mut visible = Vec::new();
        for network in state.networks.iter_mut() {
            let mut landed = Vec::new();
            network.pending_tags.retain_mut(|(tags, lag)| {
                let visible = lag.as_mut().map_or(false, Countdown::tick);
                if visible {
                    landed.push(tags.clone());
                }
                !visible
            });
            for tags in landed {
                network.native.tags.extend(tags);
            }

            if network.visible_in.tick() {
                visible.push(network.native.clone());
            }
        }
        Ok(visible)
    }

    async fn delete_network(&self, network_id: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("delete_network")?;
        state.network(network_id)?;

        let subnets = state
            .subnets
            .iter()
            .filter(|s| s.native.network_id == network_id)
            .count();
        let groups = state
            .groups
            .iter()
            .filter(|g| g.network_id == network_id)
            .count();
        if subnets > 0 || groups > 0 {
            return Err(DriverError::dependency_violation(format!(
                "network {} still has {} subnets and {} security groups",
                network_id, subnets, groups
            )));
        }

        state.networks.retain(|n| n.native.id != network_id);
        debug!("Deleted network {}", network_id);
        Ok(())
    }

    async fn create_subnet(
        &self,
        network_id: &str,
        cidr: &str,
        zone: &str,
        tags: &Tags,
    ) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.take_fault("create_subnet")?;

        let block = parse_block(cidr)?;
        let network = state.network(network_id)?;
        let siblings: Vec<CidrBlock> = state
            .subnets
            .iter()
            .filter(|s| s.native.network_id == network_id)
            .map(|s| s.block)
            .collect();
        validate_subnet_placement(&network.block, &block, &siblings)
            .map_err(|e| DriverError::invalid_parameter(format!("subnet in {}: {}", network_id, e)))?;

        let zone_ok = match self.provider {
            CloudProvider::Aws => self.zones(&network.native.region).iter().any(|z| z == zone),
            CloudProvider::Gce => zone == network.native.region,
        };
        if !zone_ok {
            return Err(DriverError::invalid_parameter(format!(
                "{} is not a valid location for a subnet in {}",
                zone, network.native.region
            )));
        }

        let id = resource_id("subnet");
        state.subnets.push(SubnetRecord {
            native: NativeSubnet {
                id: id.clone(),
                network_id: network_id.to_string(),
                cidr: block.to_string(),
                zone: zone.to_string(),
                tags: tags.clone(),
            },
            block,
            visible_in: Countdown(self.settings.subnet_visibility_polls),
            deleting: None,
            hosts_assigned: 0,
        });
        debug!("Created subnet {} ({}) in {}", id, block, zone);
        Ok(id)
    }

    async fn describe_subnets(&self, network_id: &str) -> DriverResult<Vec<NativeSubnet>> {
        let mut state = self.state.lock();
        state.take_fault("describe_subnets")?;

        let mut visible = Vec::new();
        state.subnets.retain_mut(|subnet| {
            if subnet.native.network_id != network_id {
                return true;
            }
            if let Some(deleting) = subnet.deleting.as_mut() {
                if deleting.tick() {
                    return false;
                }
            }
            if subnet.visible_in.tick() {
                visible.push(subnet.native.clone());
            }
            true
        });
        Ok(visible)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("delete_subnet")?;

        let in_use = state
            .scaling_groups
            .iter()
            .flat_map(|g| g.instances.iter())
            .filter(|i| i.subnet_id == subnet_id && !i.state().is_terminated())
            .count();
        if in_use > 0 {
            return Err(DriverError::dependency_violation(format!(
                "subnet {} still has {} instances",
                subnet_id, in_use
            )));
        }

        let lag = self.settings.subnet_deletion_polls;
        let subnet = state
            .subnets
            .iter_mut()
            .find(|s| s.native.id == subnet_id)
            .ok_or_else(|| DriverError::not_found(format!("subnet {} does not exist", subnet_id)))?;
        if subnet.deleting.is_none() {
            subnet.deleting = Some(Countdown(lag));
            debug!("Deleting subnet {}", subnet_id);
        }
        Ok(())
    }

    async fn create_security_group(&self, network_id: &str, name: &str) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.take_fault("create_security_group")?;
        state.network(network_id)?;

        if state
            .groups
            .iter()
            .any(|g| g.network_id == network_id && g.name == name)
        {
            return Err(DriverError::duplicate(format!(
                "security group {} already exists in {}",
                name, network_id
            )));
        }

        let id = resource_id("sg");
        state.groups.push(NativeSecurityGroup {
            id: id.clone(),
            name: name.to_string(),
            network_id: network_id.to_string(),
            rules: Vec::new(),
        });
        debug!("Created security group {} ({})", id, name);
        Ok(id)
    }

    async fn describe_security_groups(
        &self,
        network_id: Option<&str>,
    ) -> DriverResult<Vec<NativeSecurityGroup>> {
        let mut state = self.state.lock();
        state.take_fault("describe_security_groups")?;

        Ok(state
            .groups
            .iter()
            .filter(|g| network_id.map_or(true, |id| g.network_id == id))
            .cloned()
            .collect())
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &NativeRule) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("authorize_ingress")?;

        for cidr in &rule.source_cidrs {
            parse_block(cidr)?;
        }
        for source in &rule.source_groups {
            if !state.groups.iter().any(|g| &g.id == source) {
                return Err(DriverError::not_found(format!(
                    "security group {} does not exist",
                    source
                )));
            }
        }

        let protocol = rule.protocol.to_ascii_lowercase();
        let group = state.group_mut(group_id)?;
        match group
            .rules
            .iter_mut()
            .find(|r| r.matches_port(&protocol, rule.port))
        {
            Some(existing) => {
                let duplicate = rule
                    .source_groups
                    .iter()
                    .any(|s| existing.source_groups.contains(s))
                    || rule
                        .source_cidrs
                        .iter()
                        .any(|c| existing.source_cidrs.contains(c));
                if duplicate {
                    return Err(DriverError::duplicate(format!(
                        "permission {}/{} already exists on {}",
                        rule.port, protocol, group_id
                    )));
                }
                existing.source_groups.extend(rule.source_groups.iter().cloned());
                existing.source_cidrs.extend(rule.source_cidrs.iter().cloned());
            }
            None => group.rules.push(NativeRule {
                protocol,
                port: rule.port,
                source_groups: rule.source_groups.clone(),
                source_cidrs: rule.source_cidrs.clone(),
            }),
        }
        Ok(())
    }

    async fn revoke_ingress(&self, group_id: &str, rule: &NativeRule) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("revoke_ingress")?;

        let group = state.group_mut(group_id)?;
        let missing = || {
            DriverError::not_found(format!(
                "permission {}/{} does not exist on {}",
                rule.port, rule.protocol, group_id
            ))
        };

        let index = group
            .rules
            .iter()
            .position(|r| r.matches_port(&rule.protocol, rule.port))
            .ok_or_else(missing)?;
        let existing = &mut group.rules[index];

        let present = rule
            .source_groups
            .iter()
            .all(|s| existing.source_groups.contains(s))
            && rule
                .source_cidrs
                .iter()
                .all(|c| existing.source_cidrs.contains(c));
        if !present {
            return Err(missing());
        }

        existing
            .source_groups
            .retain(|s| !rule.source_groups.contains(s));
        existing
            .source_cidrs
            .retain(|c| !rule.source_cidrs.contains(c));
        if existing.source_groups.is_empty() && existing.source_cidrs.is_empty() {
            group.rules.remove(index);
        }
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("delete_security_group")?;
        state.group_mut(group_id)?;

        if let Some((template_id, _)) = state
            .templates
            .iter()
            .find(|(_, spec)| spec.security_group_id == group_id)
        {
            return Err(DriverError::dependency_violation(format!(
                "security group {} is used by launch template {}",
                group_id, template_id
            )));
        }

        state.groups.retain(|g| g.id != group_id);
        debug!("Deleted security group {}", group_id);
        Ok(())
    }

    async fn create_launch_template(&self, spec: &LaunchTemplateSpec) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.take_fault("create_launch_template")?;

        if state.templates.iter().any(|(_, t)| t.name == spec.name) {
            return Err(DriverError::duplicate(format!(
                "launch template {} already exists",
                spec.name
            )));
        }
        if !state.images.iter().any(|i| i.native.id == spec.image_id) {
            return Err(DriverError::invalid_parameter(format!(
                "image {} does not exist",
                spec.image_id
            )));
        }
        state.group_mut(&spec.security_group_id)?;

        let id = resource_id("lt");
        state.templates.push((id.clone(), spec.clone()));
        Ok(id)
    }

    async fn delete_launch_template(&self, template_id: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("delete_launch_template")?;

        if !state.templates.iter().any(|(id, _)| id == template_id) {
            return Err(DriverError::not_found(format!(
                "launch template {} does not exist",
                template_id
            )));
        }
        if let Some(group) = state
            .scaling_groups
            .iter()
            .find(|g| g.spec.launch_template_id == template_id)
        {
            return Err(DriverError::dependency_violation(format!(
                "launch template {} is used by scaling group {}",
                template_id, group.spec.name
            )));
        }

        state.templates.retain(|(id, _)| id != template_id);
        Ok(())
    }

    async fn create_scaling_group(&self, spec: &ScalingGroupSpec) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("create_scaling_group")?;

        if state.scaling_groups.iter().any(|g| g.spec.name == spec.name) {
            return Err(DriverError::duplicate(format!(
                "scaling group {} already exists",
                spec.name
            )));
        }
        if !state
            .templates
            .iter()
            .any(|(id, _)| id == &spec.launch_template_id)
        {
            return Err(DriverError::not_found(format!(
                "launch template {} does not exist",
                spec.launch_template_id
            )));
        }
        if spec.subnet_ids.is_empty() {
            return Err(DriverError::invalid_parameter(format!(
                "scaling group {} needs at least one subnet",
                spec.name
            )));
        }
        for subnet_id in &spec.subnet_ids {
            if !state
                .subnets
                .iter()
                .any(|s| &s.native.id == subnet_id && s.deleting.is_none())
            {
                return Err(DriverError::not_found(format!(
                    "subnet {} does not exist",
                    subnet_id
                )));
            }
        }

        state.scaling_groups.push(ScalingGroupRecord {
            spec: spec.clone(),
            instances: Vec::new(),
            launched: 0,
            deleting: None,
        });
        let index = state.scaling_groups.len() - 1;
        for _ in 0..spec.desired_capacity {
            self.launch(&mut state, index)?;
        }
        debug!(
            "Created scaling group {} with {} instances",
            spec.name, spec.desired_capacity
        );
        Ok(())
    }

    async fn describe_scaling_groups(
        &self,
        names: &[String],
    ) -> DriverResult<Vec<NativeScalingGroup>> {
        let mut state = self.state.lock();
        state.take_fault("describe_scaling_groups")?;

        let mut described = Vec::new();
        state.scaling_groups.retain_mut(|group| {
            if !names.contains(&group.spec.name) {
                return true;
            }
            if let Some(deleting) = group.deleting.as_mut() {
                if deleting.tick() {
                    return false;
                }
            }
            for instance in group.instances.iter_mut() {
                instance.observe();
            }
            described.push(NativeScalingGroup {
                name: group.spec.name.clone(),
                launch_template_id: group.spec.launch_template_id.clone(),
                subnet_ids: group.spec.subnet_ids.clone(),
                desired_capacity: group.spec.desired_capacity,
                instances: group.instances.iter().map(InstanceRecord::native).collect(),
                status: group.deleting.map(|_| "Delete in progress".to_string()),
            });
            true
        });
        Ok(described)
    }

    async fn set_desired_capacity(&self, name: &str, capacity: u32) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("set_desired_capacity")?;

        let termination_lag = self.settings.instance_termination_polls;
        let group = state.scaling_group_mut(name)?;
        if group.deleting.is_some() {
            return Err(DriverError::invalid_parameter(format!(
                "scaling group {} is being deleted",
                name
            )));
        }
        group.spec.desired_capacity = capacity;

        let live = group.instances.iter().filter(|i| i.is_live()).count();
        let wanted = capacity as usize;
        if live > wanted {
            let mut excess = live - wanted;
            for instance in group.instances.iter_mut().rev() {
                if excess == 0 {
                    break;
                }
                if instance.is_live() {
                    instance.apply(InstanceCommand::Terminate);
                    instance.progress = Countdown(termination_lag);
                    excess -= 1;
                }
            }
        }

        if wanted > live {
            let index = state
                .scaling_groups
                .iter()
                .position(|g| g.spec.name == name)
                .ok_or_else(|| DriverError::not_found(format!("scaling group {} does not exist", name)))?;
            for _ in live..wanted {
                self.launch(&mut state, index)?;
            }
        }
        debug!("Scaling group {} desired capacity set to {}", name, capacity);
        Ok(())
    }

    async fn delete_scaling_group(&self, name: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_fault("delete_scaling_group")?;

        let lag = self.settings.scaling_group_deletion_polls;
        let group = state.scaling_group_mut(name)?;
        let remaining = group
            .instances
            .iter()
            .filter(|i| !i.state().is_terminated())
            .count();
        if remaining > 0 {
            return Err(DriverError::dependency_violation(format!(
                "scaling group {} still has {} instances",
                name, remaining
            )));
        }

        if group.deleting.is_none() {
            group.deleting = Some(Countdown(lag));
            debug!("Deleting scaling group {}", name);
        }
        Ok(())
    }
}
