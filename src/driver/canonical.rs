// Copyright (c) 2025 - Cowboy AI, Inc.
//! Canonicalization of provider-native records
//!
//! The only place native records are interpreted. Every conversion validates
//! what the core relies on; a record that violates it is reported as
//! [`TopologyError::BadEnvironmentState`] instead of being guessed at.

use std::net::Ipv4Addr;

use super::{
    NativeInstance, NativeNetwork, NativeRule, NativeScalingGroup, NativeSecurityGroup,
    NativeSubnet, NAME_TAG, SERVICE_TAG,
};
use crate::domain::{
    CidrBlock, Instance, InstanceState, Network, PortSpec, Protocol, Service, Subnetwork,
};
use crate::errors::{TopologyError, TopologyResult};

fn bad_state(message: String) -> TopologyError {
    TopologyError::BadEnvironmentState(message)
}

/// Parse a CIDR reported by the provider
pub fn cidr(value: &str, owner: &str) -> TopologyResult<CidrBlock> {
    CidrBlock::new(value).map_err(|e| bad_state(format!("{} reports CIDR {:?}: {}", owner, value, e)))
}

fn address(value: Option<&String>, owner: &str) -> TopologyResult<Option<Ipv4Addr>> {
    value
        .map(|v| {
            v.parse::<Ipv4Addr>()
                .map_err(|e| bad_state(format!("{} reports address {:?}: {}", owner, v, e)))
        })
        .transpose()
}

/// Name tag of a network, if it has one
pub fn network_name(native: &NativeNetwork) -> Option<&str> {
    native
        .tags
        .get(NAME_TAG)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// Canonical network, or `None` for a network without a name tag
pub fn network(native: &NativeNetwork) -> TopologyResult<Option<Network>> {
    let Some(name) = network_name(native) else {
        return Ok(None);
    };

    Ok(Some(Network {
        id: native.id.clone(),
        name: name.to_string(),
        block: cidr(&native.cidr, &native.id)?,
        region: native.region.clone(),
    }))
}

pub fn instance_state(value: &str, owner: &str) -> TopologyResult<InstanceState> {
    value
        .parse::<InstanceState>()
        .map_err(|e| bad_state(format!("{}: {}", owner, e)))
}

pub fn instance(native: &NativeInstance) -> TopologyResult<Instance> {
    Ok(Instance {
        id: native.id.clone(),
        private_address: address(native.private_ip.as_ref(), &native.id)?,
        public_address: address(native.public_ip.as_ref(), &native.id)?,
        state: instance_state(&native.state, &native.id)?,
        zone: native.zone.clone(),
        subnet_id: native.subnet_id.clone(),
        launched_at: native.launched_at,
    })
}

/// Whether `subnet` is tagged as belonging to `service`
pub fn belongs_to_service(subnet: &NativeSubnet, service: &str) -> bool {
    subnet.tags.get(SERVICE_TAG).map(String::as_str) == Some(service)
}

/// Canonical subnetwork holding the instances launched into it
///
/// # Errors
/// - `BadEnvironmentState` if the block is unparseable or lies outside `network`
pub fn subnetwork(
    native: &NativeSubnet,
    network: &Network,
    instances: &[Instance],
) -> TopologyResult<Subnetwork> {
    let block = cidr(&native.cidr, &native.id)?;
    if !network.block.contains(&block) {
        return Err(bad_state(format!(
            "subnet {} ({}) lies outside network {} ({})",
            native.id, block, network.name, network.block
        )));
    }

    let mut instances: Vec<Instance> = instances
        .iter()
        .filter(|i| i.subnet_id == native.id)
        .cloned()
        .collect();
    instances.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(Subnetwork {
        id: native.id.clone(),
        network_id: native.network_id.clone(),
        cidr: block,
        zone: native.zone.clone(),
        instances,
    })
}

/// Provider scaling group (and launch template) name for a service
pub fn scaling_group_name(network: &Network, service: &str) -> String {
    format!("{}-{}", network.id, service)
}

/// Assemble a service from its access-control group, its tagged subnets and
/// its scaling group (absent while the service is being torn down)
///
/// # Errors
/// - `BadEnvironmentState` if an instance sits in a subnet the service does not own
pub fn service(
    network: &Network,
    group: &NativeSecurityGroup,
    subnets: &[NativeSubnet],
    scaling_group: Option<&NativeScalingGroup>,
) -> TopologyResult<Service> {
    let instances = scaling_group
        .map(|g| g.instances.iter().map(instance).collect::<TopologyResult<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    let mut subnetworks = subnets
        .iter()
        .filter(|s| belongs_to_service(s, &group.name))
        .map(|s| subnetwork(s, network, &instances))
        .collect::<TopologyResult<Vec<_>>>()?;
    subnetworks.sort_by(|a, b| a.zone.cmp(&b.zone).then(a.cidr.cmp(&b.cidr)));

    if let Some(stray) = instances
        .iter()
        .find(|i| !subnetworks.iter().any(|s| s.id == i.subnet_id))
    {
        return Err(bad_state(format!(
            "instance {} of service {} runs in subnet {} the service does not own",
            stray.id, group.name, stray.subnet_id
        )));
    }

    Ok(Service {
        name: group.name.clone(),
        network: network.name.clone(),
        network_id: network.id.clone(),
        security_group_id: group.id.clone(),
        scaling_group: scaling_group_name(network, &group.name),
        subnetworks,
    })
}

/// Protocol and port of a rule, `None` for protocols paths cannot express
pub fn port_spec(rule: &NativeRule) -> Option<PortSpec> {
    let protocol = match rule.protocol.to_ascii_lowercase().as_str() {
        "tcp" => Protocol::Tcp,
        "udp" => Protocol::Udp,
        _ => return None,
    };
    Some(PortSpec {
        protocol,
        port: rule.port,
    })
}
