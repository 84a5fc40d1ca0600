// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Path Compilation
//!
//! Paths written as rules read back as the same paths, internet
//! accessibility follows from the routability of the added ranges alone, and
//! removal revokes access.

use std::net::Ipv4Addr;

use cim_topology::cidr::non_routable_ranges;
use cim_topology::domain::{CidrBlock, Endpoint, Path, PortSpec, Protocol, ServiceRef};
use cim_topology::{CloudProvider, ServiceSpec, SimulationSettings, TopologyClient};
use proptest::prelude::*;
use tokio::runtime::Runtime;

use crate::fixtures::{client_with, with_network, IMAGE};

/// Nested public and private ranges, so generated ranges often overlap or
/// contain each other
fn range() -> impl Strategy<Value = CidrBlock> {
    prop_oneof![
        Just(CidrBlock::any()),
        (any::<bool>(), prop::sample::select(vec![8u8, 16, 24]), 0u8..4).prop_map(
            |(public, len, third)| {
                let address = if public {
                    Ipv4Addr::new(20, 0, third, 0)
                } else {
                    Ipv4Addr::new(10, 0, third, 0)
                };
                CidrBlock::from_parts(address, len).expect("valid prefix length")
            }
        ),
    ]
}

fn rule() -> impl Strategy<Value = (CidrBlock, Protocol, u16)> {
    (
        range(),
        prop_oneof![Just(Protocol::Tcp), Just(Protocol::Udp)],
        20u16..24,
    )
}

async fn topology() -> TopologyClient {
    let (_, client) = client_with(CloudProvider::Aws, SimulationSettings::instant());
    with_network(&client).await;
    client
        .services()
        .create("n1", "web", &ServiceSpec::new(IMAGE).with_zones(1))
        .await
        .expect("service web");
    client
}

fn edge(block: CidrBlock, protocol: Protocol, port: u16) -> Path {
    Path {
        network: "n1".to_string(),
        source: Endpoint::from(block),
        destination: Endpoint::service("n1", "web"),
        protocol,
        port,
    }
}

/// Paths left after adding `rules` in order: a range already contained in a
/// written one on the same port is not written again
fn expected(rules: &[(CidrBlock, Protocol, u16)]) -> Vec<Path> {
    let mut written: Vec<(CidrBlock, Protocol, u16)> = Vec::new();
    for (block, protocol, port) in rules {
        let covered = written
            .iter()
            .any(|(b, pr, po)| pr == protocol && po == port && b.contains(block));
        if !covered {
            written.push((*block, *protocol, *port));
        }
    }
    let mut paths: Vec<Path> = written
        .into_iter()
        .map(|(block, protocol, port)| edge(block, protocol, port))
        .collect();
    paths.sort();
    paths
}

async fn add_all(client: &TopologyClient, rules: &[(CidrBlock, Protocol, u16)]) {
    for (block, protocol, port) in rules {
        client
            .paths()
            .add(
                Endpoint::from(*block),
                Endpoint::service("n1", "web"),
                PortSpec { protocol: *protocol, port: *port },
            )
            .await
            .expect("path added");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Added range paths are listed back once each, and every added range
    /// has access afterwards
    #[test]
    fn prop_added_paths_are_listed(rules in prop::collection::vec(rule(), 1..8)) {
        let runtime = Runtime::new().expect("runtime");
        let (listed, granted) = runtime.block_on(async {
            let client = topology().await;
            add_all(&client, &rules).await;

            let mut granted = true;
            for (block, protocol, port) in &rules {
                granted &= client
                    .paths()
                    .has_access(
                        Endpoint::from(*block),
                        Endpoint::service("n1", "web"),
                        PortSpec { protocol: *protocol, port: *port },
                    )
                    .await
                    .expect("access answered");
            }
            (client.paths().list().await.expect("paths listed"), granted)
        });

        prop_assert_eq!(listed, expected(&rules));
        prop_assert!(granted);
    }

    /// A port is internet accessible iff some added range reaches outside the
    /// non-routable ranges on it
    #[test]
    fn prop_internet_access_follows_public_ranges(
        rules in prop::collection::vec(rule(), 1..8),
        port in 20u16..24,
    ) {
        let runtime = Runtime::new().expect("runtime");
        let accessible = runtime.block_on(async {
            let client = topology().await;
            add_all(&client, &rules).await;
            client
                .paths()
                .internet_accessible(ServiceRef::new("n1", "web"), port)
                .await
                .expect("accessibility answered")
        });

        let private = non_routable_ranges();
        let expected = rules.iter().any(|(block, protocol, p)| {
            *protocol == Protocol::Tcp && *p == port && !private.iter().any(|r| r.contains(block))
        });
        prop_assert_eq!(accessible, expected);
    }

    /// After removing any range, that range no longer has access
    #[test]
    fn prop_removed_ranges_lose_access(
        rules in prop::collection::vec(rule(), 1..8),
        removed in rule(),
    ) {
        let runtime = Runtime::new().expect("runtime");
        let granted = runtime.block_on(async {
            let client = topology().await;
            add_all(&client, &rules).await;

            let (block, protocol, port) = removed;
            let web = Endpoint::service("n1", "web");
            let port = PortSpec { protocol, port };
            client
                .paths()
                .remove(Endpoint::from(block), web.clone(), port)
                .await
                .expect("path removed");
            client
                .paths()
                .has_access(Endpoint::from(block), web, port)
                .await
                .expect("access answered")
        });

        prop_assert!(!granted);
    }
}
