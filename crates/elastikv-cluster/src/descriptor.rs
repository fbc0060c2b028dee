//! Cluster descriptor materialization.
//!
//! A descriptor is the document handed to storage nodes after a size
//! change: which partitions each node serves and which replication zone
//! it belongs to. How the document reaches the nodes (the config-publish
//! service) is outside this crate; we only build the value.

use serde::{Deserialize, Serialize};

const DEFAULT_HTTP_PORT: u16 = 8081;
const DEFAULT_SOCKET_PORT: u16 = 6666;
const DEFAULT_ADMIN_PORT: u16 = 6667;

/// One replication zone and its failover preference order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneDescriptor {
    pub id: u32,
    /// Other zones in preference order, rotated so that no two zones
    /// share a first choice.
    pub proximity: Vec<u32>,
}

/// One storage node slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDescriptor {
    pub id: u32,
    pub host: String,
    pub http_port: u16,
    pub socket_port: u16,
    pub admin_port: u16,
    /// Partition IDs this node serves.
    pub partitions: Vec<u32>,
    pub zone: u32,
}

/// Full cluster layout for the storage tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterDescriptor {
    pub name: String,
    pub replication_factor: u32,
    pub zones: Vec<ZoneDescriptor>,
    pub nodes: Vec<NodeDescriptor>,
}

impl ClusterDescriptor {
    /// Build a descriptor for `hosts` (index = node slot) from a
    /// partition layout.
    ///
    /// Hosts whose slot index falls outside the layout are omitted: when
    /// shrinking, the descriptor for the smaller target size is built
    /// while the excess nodes still exist.
    pub fn build(
        name: &str,
        hosts: &[String],
        layout: &[Vec<u32>],
        replication_factor: u32,
    ) -> Self {
        let zones = (0..replication_factor)
            .map(|z| ZoneDescriptor {
                id: z,
                proximity: (1..replication_factor)
                    .map(|offset| (z + offset) % replication_factor)
                    .collect(),
            })
            .collect();

        let nodes = hosts
            .iter()
            .enumerate()
            .filter(|(id, _)| *id < layout.len())
            .map(|(id, host)| NodeDescriptor {
                id: id as u32,
                host: host.clone(),
                http_port: DEFAULT_HTTP_PORT,
                socket_port: DEFAULT_SOCKET_PORT,
                admin_port: DEFAULT_ADMIN_PORT,
                partitions: layout[id].clone(),
                zone: id as u32 % replication_factor,
            })
            .collect();

        Self {
            name: name.to_string(),
            replication_factor,
            zones,
            nodes,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
