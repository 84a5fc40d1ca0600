// Copyright (c) 2025 - Cowboy AI, Inc.
//! Blueprint accessors
//!
//! Blueprints are read, never parsed, by the topology core. Whatever file
//! format a front end uses, it hands the core something implementing these
//! traits.

use serde::{Deserialize, Serialize};

use crate::domain::CidrBlock;

/// Sizing of a new network
pub trait NetworkBlueprint {
    /// Address space the network's block is carved from
    fn parent_block(&self) -> CidrBlock;

    /// Prefix length of the network's block
    fn prefix_len(&self) -> u8;
}

/// Sizing and image of a new service
pub trait ServiceBlueprint {
    fn image_name(&self) -> &str;

    fn instance_type(&self) -> &str;

    /// Zones to spread subnets over (ignored on providers with regional subnets)
    fn availability_zone_count(&self) -> usize;

    /// Prefix length of each subnet
    fn subnet_prefix_len(&self) -> u8;

    /// Desired number of instances
    fn instance_count(&self) -> u32;
}

/// Plain-data [`NetworkBlueprint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub parent_block: CidrBlock,
    pub prefix_len: u8,
}

impl NetworkSpec {
    pub fn new(parent_block: CidrBlock, prefix_len: u8) -> Self {
        Self {
            parent_block,
            prefix_len,
        }
    }
}

impl NetworkBlueprint for NetworkSpec {
    fn parent_block(&self) -> CidrBlock {
        self.parent_block
    }

    fn prefix_len(&self) -> u8 {
        self.prefix_len
    }
}

/// Plain-data [`ServiceBlueprint`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub image_name: String,

    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    #[serde(default = "default_zone_count")]
    pub availability_zone_count: usize,

    #[serde(default = "default_subnet_prefix_len")]
    pub subnet_prefix_len: u8,

    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
}

fn default_instance_type() -> String {
    "t3.micro".to_string()
}

fn default_zone_count() -> usize {
    3
}

fn default_subnet_prefix_len() -> u8 {
    24
}

fn default_instance_count() -> u32 {
    1
}

impl ServiceSpec {
    /// Blueprint for `image_name` with default sizing
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            instance_type: default_instance_type(),
            availability_zone_count: default_zone_count(),
            subnet_prefix_len: default_subnet_prefix_len(),
            instance_count: default_instance_count(),
        }
    }

    pub fn with_zones(mut self, count: usize) -> Self {
        self.availability_zone_count = count;
        self
    }

    pub fn with_subnet_prefix_len(mut self, prefix_len: u8) -> Self {
        self.subnet_prefix_len = prefix_len;
        self
    }

    pub fn with_instances(mut self, count: u32) -> Self {
        self.instance_count = count;
        self
    }

    pub fn with_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = instance_type.into();
        self
    }
}

impl ServiceBlueprint for ServiceSpec {
    fn image_name(&self) -> &str {
        &self.image_name
    }

    fn instance_type(&self) -> &str {
        &self.instance_type
    }

    fn availability_zone_count(&self) -> usize {
        self.availability_zone_count
    }

    fn subnet_prefix_len(&self) -> u8 {
        self.subnet_prefix_len
    }

    fn instance_count(&self) -> u32 {
        self.instance_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_spec_defaults_from_json() {
        let spec: ServiceSpec =
            serde_json::from_value(serde_json::json!({ "image_name": "base" })).unwrap();
        assert_eq!(spec, ServiceSpec::new("base"));
        assert_eq!(spec.subnet_prefix_len(), 24);
        assert_eq!(spec.availability_zone_count(), 3);
    }

    #[test]
    fn test_network_spec_accessors() {
        let spec = NetworkSpec::new(CidrBlock::new("10.0.0.0/8").unwrap(), 16);
        assert_eq!(spec.parent_block().to_string(), "10.0.0.0/8");
        assert_eq!(NetworkBlueprint::prefix_len(&spec), 16);
    }
}
