//! In-process cluster backend.
//!
//! Stands in for the real provisioning client and rebalance tool: keeps
//! a node roster in memory, materializes a fresh descriptor on every
//! rebalance, and records every call so tests (and dry runs) can inspect
//! what the actuator did.

use std::sync::Mutex;
use std::time::Duration;

use tracing::info;

use elastikv_partition::PartitionGenerator;

use crate::descriptor::ClusterDescriptor;
use crate::ClusterBackend;

#[derive(Debug)]
struct Inner {
    hosts: Vec<String>,
    generator: PartitionGenerator,
    descriptor: Option<ClusterDescriptor>,
    rebalance_targets: Vec<u32>,
    decommissioned: Vec<u32>,
}

/// [`ClusterBackend`] that manages a purely in-memory node roster.
#[derive(Debug)]
pub struct InMemoryCluster {
    name: String,
    total_partitions: u32,
    replication_factor: u32,
    inner: Mutex<Inner>,
}

impl InMemoryCluster {
    pub fn new(
        name: &str,
        total_partitions: u32,
        replication_factor: u32,
        initial_nodes: u32,
    ) -> Self {
        let hosts = (0..initial_nodes).map(host_for).collect();
        Self {
            name: name.to_string(),
            total_partitions,
            replication_factor,
            inner: Mutex::new(Inner {
                hosts,
                generator: PartitionGenerator::new(),
                descriptor: None,
                rebalance_targets: Vec::new(),
                decommissioned: Vec::new(),
            }),
        }
    }

    /// Descriptor produced by the most recent rebalance, if any.
    pub fn descriptor(&self) -> Option<ClusterDescriptor> {
        self.inner.lock().expect("cluster lock").descriptor.clone()
    }

    /// Target sizes of every rebalance triggered so far, in order.
    pub fn rebalance_targets(&self) -> Vec<u32> {
        self.inner
            .lock()
            .expect("cluster lock")
            .rebalance_targets
            .clone()
    }

    /// Node indices decommissioned so far, in order.
    pub fn decommissioned(&self) -> Vec<u32> {
        self.inner
            .lock()
            .expect("cluster lock")
            .decommissioned
            .clone()
    }
}

fn host_for(index: u32) -> String {
    format!("node-{index}")
}

impl ClusterBackend for InMemoryCluster {
    fn request_nodes(&self, count: u32) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().expect("cluster lock");
        let start = inner.hosts.len() as u32;
        for i in start..start + count {
            inner.hosts.push(host_for(i));
        }
        info!(count, total = inner.hosts.len(), "nodes provisioned");
        Ok(())
    }

    fn decommission_node(&self, node_index: u32) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().expect("cluster lock");
        inner.hosts.retain(|h| *h != host_for(node_index));
        inner.decommissioned.push(node_index);
        info!(node_index, remaining = inner.hosts.len(), "node decommissioned");
        Ok(())
    }

    fn observed_node_count(&self) -> anyhow::Result<u32> {
        Ok(self.inner.lock().expect("cluster lock").hosts.len() as u32)
    }

    fn trigger_rebalance(&self, target_nodes: u32) -> anyhow::Result<Duration> {
        let mut inner = self.inner.lock().expect("cluster lock");
        let layout = inner.generator.assign(self.total_partitions, target_nodes);
        let descriptor =
            ClusterDescriptor::build(&self.name, &inner.hosts, &layout, self.replication_factor);
        inner.descriptor = Some(descriptor);
        inner.rebalance_targets.push(target_nodes);
        info!(target_nodes, "rebalance completed");
        Ok(Duration::ZERO)
    }
}
