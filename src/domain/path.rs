// Copyright (c) 2025 - Cowboy AI, Inc.
//! Path Value Objects
//!
//! A [`Path`] is a declared permitted connection: traffic from `source` may
//! reach `destination` on `protocol`/`port`. Endpoints are either services
//! (resolved to access-control groups) or plain address ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::network::{CidrBlock, NetworkError};
use super::service::Service;

/// Transport protocol of a path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol and port a path applies to
///
/// A bare `u16` converts to a TCP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortSpec {
    pub protocol: Protocol,
    pub port: u16,
}

impl PortSpec {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port,
        }
    }

    pub fn udp(port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            port,
        }
    }
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        Self::tcp(port)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// Reference to a service by network and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceRef {
    pub network: String,
    pub name: String,
}

impl ServiceRef {
    pub fn new(network: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.name)
    }
}

impl From<&Service> for ServiceRef {
    fn from(service: &Service) -> Self {
        Self::new(service.network.clone(), service.name.clone())
    }
}

/// One end of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Service(ServiceRef),
    Cidr { block: CidrBlock },
}

impl Endpoint {
    pub fn service(network: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Service(ServiceRef::new(network, name))
    }

    /// Address-range endpoint parsed from CIDR notation
    pub fn cidr(block: impl AsRef<str>) -> Result<Self, NetworkError> {
        Ok(Self::Cidr {
            block: CidrBlock::new(block)?,
        })
    }

    /// Address-range endpoint covering the whole address space
    pub fn anywhere() -> Self {
        Self::Cidr {
            block: CidrBlock::any(),
        }
    }

    pub fn as_service(&self) -> Option<&ServiceRef> {
        match self {
            Self::Service(service) => Some(service),
            Self::Cidr { .. } => None,
        }
    }

    pub fn as_cidr(&self) -> Option<&CidrBlock> {
        match self {
            Self::Service(_) => None,
            Self::Cidr { block } => Some(block),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(service) => write!(f, "{}", service),
            Self::Cidr { block } => write!(f, "{}", block),
        }
    }
}

impl From<ServiceRef> for Endpoint {
    fn from(service: ServiceRef) -> Self {
        Self::Service(service)
    }
}

impl From<&Service> for Endpoint {
    fn from(service: &Service) -> Self {
        Self::Service(service.into())
    }
}

impl From<CidrBlock> for Endpoint {
    fn from(block: CidrBlock) -> Self {
        Self::Cidr { block }
    }
}

/// Permitted connection edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path {
    /// Network the destination service lives in
    pub network: String,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub protocol: Protocol,
    pub port: u16,
}

impl Path {
    pub fn port_spec(&self) -> PortSpec {
        PortSpec {
            protocol: self.protocol,
            port: self.port,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}/{})",
            self.source, self.destination, self.port, self.protocol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_port_is_tcp() {
        let spec: PortSpec = 443.into();
        assert_eq!(spec, PortSpec::tcp(443));
        assert_eq!(spec.to_string(), "443/tcp");
        assert_eq!(PortSpec::udp(53).to_string(), "53/udp");
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::service("n1", "web").to_string(), "n1/web");
        assert_eq!(Endpoint::anywhere().to_string(), "0.0.0.0/0");
        assert_eq!(
            Endpoint::cidr("10.1.2.3/8").unwrap().to_string(),
            "10.0.0.0/8"
        );
    }

    #[test]
    fn test_endpoint_serde_is_tagged() {
        let json = serde_json::to_value(Endpoint::anywhere()).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "cidr", "block": "0.0.0.0/0"}));

        let json = serde_json::to_value(Endpoint::service("n1", "db")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "service", "network": "n1", "name": "db"})
        );
    }

    #[test]
    fn test_path_display() {
        let path = Path {
            network: "n1".to_string(),
            source: Endpoint::service("n1", "web"),
            destination: Endpoint::service("n1", "db"),
            protocol: Protocol::Tcp,
            port: 5432,
        };
        assert_eq!(path.to_string(), "n1/web -> n1/db (5432/tcp)");
        assert_eq!(path.port_spec(), PortSpec::tcp(5432));
    }
}
