//! Cluster collaborator seam.
//!
//! The controller never talks to the provisioning API or the rebalance
//! tool directly; everything goes through [`ClusterBackend`]. The methods
//! are deliberately blocking — the actuator worker runs them from a
//! blocking task and the underlying rebalance mechanism cannot run two
//! instances concurrently anyway.

mod descriptor;
mod memory;

use std::time::Duration;

pub use descriptor::{ClusterDescriptor, NodeDescriptor, ZoneDescriptor};
pub use memory::InMemoryCluster;

/// The managed storage cluster, as the actuator sees it.
pub trait ClusterBackend: Send + Sync {
    /// Provision `count` additional storage nodes. Blocks until every
    /// new node reports ready.
    fn request_nodes(&self, count: u32) -> anyhow::Result<()>;

    /// Tear down the node at the given slot index.
    fn decommission_node(&self, node_index: u32) -> anyhow::Result<()>;

    /// Node count as the cluster itself reports it. Used to detect drift
    /// between the controller's bookkeeping and reality.
    fn observed_node_count(&self) -> anyhow::Result<u32>;

    /// Run the external rebalance operation towards `target_nodes`
    /// storage nodes. Blocks until the operation completes and returns
    /// its elapsed time.
    fn trigger_rebalance(&self, target_nodes: u32) -> anyhow::Result<Duration>;
}
