//! Deterministic partition-to-node assignment.
//!
//! Produces the partition layout a rebalance moves the store towards.
//! The layout is reproducible across runs and grows incrementally: going
//! from `N` to `N + 1` nodes only moves partitions into the new node,
//! never between nodes that already existed.

mod generator;

pub use generator::PartitionGenerator;
