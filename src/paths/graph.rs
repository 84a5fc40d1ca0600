// Copyright (c) 2025 - Cowboy AI, Inc.
//! Graph-shaped path listings

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::{Endpoint, Path, ServiceRef};

/// Paths of one network as a graph: endpoints are nodes, paths are edges
///
/// Services without any path still appear as nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathGraph {
    pub network: String,
    pub nodes: Vec<Endpoint>,
    pub edges: Vec<Path>,
}

impl PathGraph {
    pub fn new(
        network: impl Into<String>,
        services: impl IntoIterator<Item = ServiceRef>,
        edges: Vec<Path>,
    ) -> Self {
        let mut nodes: BTreeSet<Endpoint> = services.into_iter().map(Endpoint::Service).collect();
        for edge in &edges {
            nodes.insert(edge.source.clone());
            nodes.insert(edge.destination.clone());
        }

        let mut edges = edges;
        edges.sort();
        edges.dedup();

        Self {
            network: network.into(),
            nodes: nodes.into_iter().collect(),
            edges,
        }
    }

    /// Paths leaving `endpoint`
    pub fn edges_from<'g>(&'g self, endpoint: &'g Endpoint) -> impl Iterator<Item = &'g Path> {
        self.edges.iter().filter(move |e| &e.source == endpoint)
    }

    /// Paths arriving at `endpoint`
    pub fn edges_to<'g>(&'g self, endpoint: &'g Endpoint) -> impl Iterator<Item = &'g Path> {
        self.edges.iter().filter(move |e| &e.destination == endpoint)
    }

    /// Nodes no path touches
    pub fn isolated(&self) -> impl Iterator<Item = &Endpoint> {
        self.nodes
            .iter()
            .filter(|n| self.edges_from(n).next().is_none() && self.edges_to(n).next().is_none())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for PathGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "network {} ({} nodes, {} paths)",
            self.network,
            self.nodes.len(),
            self.edges.len()
        )?;
        for edge in &self.edges {
            writeln!(f, "  {}", edge)?;
        }
        for node in self.isolated() {
            writeln!(f, "  {} (isolated)", node)?;
        }
        Ok(())
    }
}
