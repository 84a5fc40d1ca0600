// Copyright (c) 2025 - Cowboy AI, Inc.
//! Path Compiler / Firewall Resolver
//!
//! Translates declared paths into ingress rules on the destination service's
//! access-control group, and provider rules back into paths.
//!
//! # Rule shape
//!
//! ```text
//! Path                               Rule on the destination's group
//! ─────────────────────────────────  ───────────────────────────────────
//! n1/web    -> n1/db  (5432/tcp)     db: tcp 5432 from group <web sg id>
//! 0.0.0.0/0 -> n1/web (443/tcp)      web: tcp 443 from 0.0.0.0/0
//! ```
//!
//! # Access semantics
//!
//! - A service source has access iff a rule on the destination references its
//!   group on the exact protocol and port.
//! - An address-range source has access iff a rule's range **overlaps** it on
//!   the exact protocol and port. Overlap, not equality.
//! - A service is internet accessible iff some externally routable fragment
//!   (see [`crate::cidr::public_fragments`]) has access.
//! - `add` writes unless a listed range contains the requested one.
//! - `remove` revokes every listed path granting the access.
//!
//! Every query works on one [`list`](PathCompiler::list) snapshot of the
//! provider's rules; the provider is the only source of truth.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::cidr::public_fragments;
use crate::domain::invariants::validate_path_endpoints;
use crate::domain::{Endpoint, Network, Path, PortSpec, ServiceRef};
use crate::driver::{canonical, DriverErrorKind, NativeRule, NativeSecurityGroup};
use crate::errors::{TopologyError, TopologyResult};
use crate::state_machine::path_lifecycle::{PathCommand, PathEffect, PathState};
use crate::state_machine::StateMachine;
use crate::topology::service::find_group;
use crate::topology::TopologyClient;

pub mod graph;

pub use graph::PathGraph;

/// Listed paths that grant `source` access to `destination` on `port`
pub fn granting<'p>(
    paths: &'p [Path],
    source: &'p Endpoint,
    destination: &'p ServiceRef,
    port: PortSpec,
) -> impl Iterator<Item = &'p Path> {
    paths
        .iter()
        .filter(move |p| p.port_spec() == port && p.destination.as_service() == Some(destination))
        .filter(move |p| match (source, &p.source) {
            (Endpoint::Service(wanted), Endpoint::Service(allowed)) => wanted == allowed,
            (Endpoint::Cidr { block: wanted }, Endpoint::Cidr { block: allowed }) => {
                allowed.overlaps(wanted)
            }
            _ => false,
        })
}

/// Whether `paths` grant `source` access to `destination` on `port`
pub fn grants(paths: &[Path], source: &Endpoint, destination: &ServiceRef, port: PortSpec) -> bool {
    granting(paths, source, destination, port).next().is_some()
}

/// Listed path that already grants everything `source` asks for
///
/// A range is covered only by a range containing it; overlap is not enough.
pub fn covering<'p>(
    paths: &'p [Path],
    source: &Endpoint,
    destination: &ServiceRef,
    port: PortSpec,
) -> Option<&'p Path> {
    paths
        .iter()
        .filter(|p| p.port_spec() == port && p.destination.as_service() == Some(destination))
        .find(|p| match (source, &p.source) {
            (Endpoint::Service(wanted), Endpoint::Service(allowed)) => wanted == allowed,
            (Endpoint::Cidr { block: wanted }, Endpoint::Cidr { block: allowed }) => {
                allowed.contains(wanted)
            }
            _ => false,
        })
}

/// Networks and access-control groups read in one pass
struct Snapshot {
    networks: Vec<Network>,
    groups: Vec<NativeSecurityGroup>,
}

impl Snapshot {
    fn network(&self, name: &str) -> TopologyResult<&Network> {
        self.networks
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| TopologyError::NotFound(format!("network {}", name)))
    }

    fn group_of(&self, service: &ServiceRef) -> TopologyResult<&NativeSecurityGroup> {
        let network = self.network(&service.network)?;
        find_group(&self.groups, network, &service.name)?
            .ok_or_else(|| TopologyError::NotFound(format!("service {}", service)))
    }

    /// Services keyed by group id
    fn services(&self) -> TopologyResult<HashMap<&str, ServiceRef>> {
        let mut services = HashMap::new();
        for network in &self.networks {
            for group in self.groups.iter().filter(|g| g.network_id == network.id) {
                find_group(&self.groups, network, &group.name)?;
                services.insert(group.id.as_str(), ServiceRef::new(&network.name, &group.name));
            }
        }
        Ok(services)
    }

    /// Every rule of every service decomposed into paths
    fn paths(&self) -> TopologyResult<Vec<Path>> {
        let services = self.services()?;
        let mut paths = Vec::new();

        for group in &self.groups {
            let Some(destination) = services.get(group.id.as_str()) else {
                continue;
            };

            for rule in &group.rules {
                let Some(port) = canonical::port_spec(rule) else {
                    debug!(
                        "Skipping {} rule on {}: protocol not expressible as a path",
                        rule.protocol, group.id
                    );
                    continue;
                };

                let mut push = |source: Endpoint| {
                    paths.push(Path {
                        network: destination.network.clone(),
                        source,
                        destination: Endpoint::Service(destination.clone()),
                        protocol: port.protocol,
                        port: port.port,
                    })
                };

                for source_group in &rule.source_groups {
                    match services.get(source_group.as_str()) {
                        Some(source) => push(Endpoint::Service(source.clone())),
                        None => warn!(
                            "Rule on {} ({}) references unknown group {}; skipping",
                            group.id, destination, source_group
                        ),
                    }
                }
                for cidr in &rule.source_cidrs {
                    push(Endpoint::from(canonical::cidr(cidr, &group.id)?));
                }
            }
        }

        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}

/// Path operations bound to a [`TopologyClient`]
#[derive(Debug, Clone, Copy)]
pub struct PathCompiler<'a> {
    client: &'a TopologyClient,
}

/// Validated request: the destination's group, the rule and the path it denotes
struct Request {
    target: ServiceRef,
    group_id: String,
    rule: NativeRule,
    path: Path,
}

impl<'a> PathCompiler<'a> {
    pub(crate) fn new(client: &'a TopologyClient) -> Self {
        Self { client }
    }

    async fn snapshot(&self) -> TopologyResult<Snapshot> {
        let networks = self.client.networks().list().await?;
        let groups = self.client.driver().describe_security_groups(None).await?;
        Ok(Snapshot { networks, groups })
    }

    fn request(
        snapshot: &Snapshot,
        source: Endpoint,
        destination: Endpoint,
        port: PortSpec,
    ) -> TopologyResult<Request> {
        validate_path_endpoints(&source, &destination)?;
        let target = destination.as_service().cloned().ok_or_else(|| {
            TopologyError::DisallowedOperation(format!("destination {} is not a service", destination))
        })?;
        let group = snapshot.group_of(&target)?;

        let rule = Self::rule(snapshot, &source, port)?;

        Ok(Request {
            group_id: group.id.clone(),
            rule,
            path: Path {
                network: target.network.clone(),
                source,
                destination,
                protocol: port.protocol,
                port: port.port,
            },
            target,
        })
    }

    /// Ingress rule admitting `source` on `port`
    fn rule(snapshot: &Snapshot, source: &Endpoint, port: PortSpec) -> TopologyResult<NativeRule> {
        let protocol = port.protocol.as_str();
        Ok(match source {
            Endpoint::Service(service) => {
                NativeRule::from_group(protocol, port.port, snapshot.group_of(service)?.id.clone())
            }
            Endpoint::Cidr { block } => NativeRule::from_cidr(protocol, port.port, block.to_string()),
        })
    }

    async fn apply(
        &self,
        effect: PathEffect,
        group_id: &str,
        rule: &NativeRule,
        path: &Path,
    ) -> TopologyResult<()> {
        let driver = self.client.driver();
        match effect {
            PathEffect::Authorize => match driver.authorize_ingress(group_id, rule).await {
                Err(e) if e.kind == DriverErrorKind::Duplicate => {
                    debug!("{} already authorized: {}", path, e);
                    Ok(())
                }
                result => result.map_err(TopologyError::from),
            },
            PathEffect::Revoke => match driver.revoke_ingress(group_id, rule).await {
                Err(e) if e.is_not_found() => {
                    debug!("{} already revoked: {}", path, e);
                    Ok(())
                }
                result => result.map_err(TopologyError::from),
            },
            PathEffect::Nothing => {
                debug!("{}: nothing to do", path);
                Ok(())
            }
        }
    }

    /// Permit `source` to reach `destination` on `port`
    ///
    /// A no-op if a listed path already covers the request, in which case
    /// that path is returned. A range partly overlapping an existing rule
    /// is still written.
    ///
    /// # Errors
    /// - `DisallowedOperation` for endpoints a rule cannot express
    /// - `NotFound` if a service or its network does not exist
    pub async fn add(
        &self,
        source: impl Into<Endpoint>,
        destination: impl Into<Endpoint>,
        port: impl Into<PortSpec>,
    ) -> TopologyResult<Path> {
        let snapshot = self.snapshot().await?;
        let request = Self::request(&snapshot, source.into(), destination.into(), port.into())?;

        let paths = snapshot.paths()?;
        let path = &request.path;
        let covered = covering(&paths, &path.source, &request.target, path.port_spec());

        let (_, effect) = PathState::from_presence(covered.is_some()).transition(&PathCommand::Add)?;
        self.apply(effect, &request.group_id, &request.rule, path).await?;
        match covered {
            Some(existing) => Ok(existing.clone()),
            None => {
                info!("Added path {}", request.path);
                Ok(request.path)
            }
        }
    }

    /// Revoke access from `source` to `destination` on `port`
    ///
    /// Every listed path granting the access is revoked, so a range source
    /// also loses the wider rules overlapping it. Removing absent access
    /// succeeds.
    ///
    /// # Errors
    /// - `DisallowedOperation` for endpoints a rule cannot express
    /// - `NotFound` if a service or its network does not exist
    pub async fn remove(
        &self,
        source: impl Into<Endpoint>,
        destination: impl Into<Endpoint>,
        port: impl Into<PortSpec>,
    ) -> TopologyResult<()> {
        let snapshot = self.snapshot().await?;
        let request = Self::request(&snapshot, source.into(), destination.into(), port.into())?;

        let paths = snapshot.paths()?;
        let path = &request.path;
        let granted: Vec<&Path> =
            granting(&paths, &path.source, &request.target, path.port_spec()).collect();

        let (_, effect) =
            PathState::from_presence(!granted.is_empty()).transition(&PathCommand::Remove)?;
        if effect != PathEffect::Revoke {
            return self.apply(effect, &request.group_id, &request.rule, path).await;
        }
        for edge in granted {
            let rule = Self::rule(&snapshot, &edge.source, edge.port_spec())?;
            self.apply(effect, &request.group_id, &rule, edge).await?;
            info!("Removed path {}", edge);
        }
        Ok(())
    }

    /// Every path of every service, sorted
    ///
    /// Rules referencing a group that belongs to no known service are
    /// skipped with a warning.
    ///
    /// # Errors
    /// - `BadEnvironmentState` for duplicate service groups or unparseable rule ranges
    pub async fn list(&self) -> TopologyResult<Vec<Path>> {
        self.snapshot().await?.paths()
    }

    /// Paths whose destination lives in `network`
    ///
    /// # Errors
    /// - `NotFound` if the network does not exist
    pub async fn list_in_network(&self, network: &str) -> TopologyResult<Vec<Path>> {
        let snapshot = self.snapshot().await?;
        snapshot.network(network)?;
        Ok(snapshot
            .paths()?
            .into_iter()
            .filter(|p| p.network == network)
            .collect())
    }

    /// # Errors
    /// - `DisallowedOperation` for endpoints a rule cannot express
    /// - `NotFound` if a service or its network does not exist
    pub async fn has_access(
        &self,
        source: impl Into<Endpoint>,
        destination: impl Into<Endpoint>,
        port: impl Into<PortSpec>,
    ) -> TopologyResult<bool> {
        let snapshot = self.snapshot().await?;
        let request = Self::request(&snapshot, source.into(), destination.into(), port.into())?;

        let path = &request.path;
        Ok(grants(&snapshot.paths()?, &path.source, &request.target, path.port_spec()))
    }

    /// Whether any externally routable address can reach `service` on `port`
    ///
    /// # Errors
    /// - `NotFound` if the service or its network does not exist
    pub async fn internet_accessible(
        &self,
        service: impl Into<ServiceRef>,
        port: impl Into<PortSpec>,
    ) -> TopologyResult<bool> {
        let service = service.into();
        let port = port.into();

        let snapshot = self.snapshot().await?;
        snapshot.group_of(&service)?;
        let paths = snapshot.paths()?;

        Ok(public_fragments()
            .into_iter()
            .any(|fragment| grants(&paths, &Endpoint::from(fragment), &service, port)))
    }

    /// Paths of `network` as a graph, including services without paths
    ///
    /// # Errors
    /// - `NotFound` if the network does not exist
    pub async fn graph(&self, network: &str) -> TopologyResult<PathGraph> {
        let snapshot = self.snapshot().await?;
        let net = snapshot.network(network)?;

        let services: Vec<ServiceRef> = snapshot
            .groups
            .iter()
            .filter(|g| g.network_id == net.id)
            .map(|g| ServiceRef::new(&net.name, &g.name))
            .collect();
        let edges = snapshot
            .paths()?
            .into_iter()
            .filter(|p| p.network == network)
            .collect();

        Ok(PathGraph::new(network, services, edges))
    }
}
