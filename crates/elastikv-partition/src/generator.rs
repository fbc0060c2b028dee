//! Partition layout generator.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Seed for the base shuffle. Must stay the same across runs: a different
/// base ordering would make every rebalance shuffle partitions between
/// nodes that did not change.
const SHUFFLE_SEED: u64 = 643823;

/// Generates partition-to-node assignments for a fixed total partition
/// count.
///
/// The shuffled base ordering is cached per partition count, so repeated
/// calls for different node counts replay the same split sequence and
/// layouts stay consistent with each other.
#[derive(Debug, Default)]
pub struct PartitionGenerator {
    /// Cached shuffled `[0, P)` sequence, keyed by its length.
    base: Option<Vec<u32>>,
}

impl PartitionGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the layout for `nodes` nodes over `partitions` total
    /// partitions.
    ///
    /// Returns one partition-ID list per node slot, index = node id.
    /// Group sizes differ by at most one whenever `nodes <= partitions`.
    /// Both arguments must be positive; this is a caller contract, not a
    /// runtime check.
    pub fn assign(&mut self, partitions: u32, nodes: u32) -> Vec<Vec<u32>> {
        debug_assert!(partitions > 0 && nodes > 0);

        let base = self.base(partitions);
        let mut groups: Vec<Vec<u32>> = vec![base.to_vec()];

        // Grow one node at a time. Each step carves the new group out of
        // the tails of all existing groups, so partitions only ever move
        // into the node being added.
        for existing in 1..nodes as usize {
            let ideal = (partitions as usize) / (existing + 1);
            let exact = partitions as f64 / (existing + 1) as f64;
            let fraction = exact - ideal as f64;
            let mut remainder = 0.0;

            let mut newborn = Vec::new();
            for group in groups.iter_mut() {
                let len = group.len();
                let mut keep = ideal;
                remainder += fraction;
                while remainder >= 0.5 && keep > 0 && keep < len {
                    keep += 1;
                    remainder -= 1.0;
                }

                // A split point outside (0, len) means this group has
                // nothing to donate this round.
                if keep > 0 && keep < len {
                    newborn.extend(group.split_off(keep));
                }
            }
            groups.push(newborn);
        }

        debug!(
            partitions,
            nodes,
            sizes = ?groups.iter().map(Vec::len).collect::<Vec<_>>(),
            "generated partition layout"
        );
        groups
    }

    /// Shuffled base ordering for `partitions`, regenerated only when the
    /// total partition count changes.
    fn base(&mut self, partitions: u32) -> &[u32] {
        let stale = self
            .base
            .as_ref()
            .is_none_or(|b| b.len() != partitions as usize);
        if stale {
            let mut parts: Vec<u32> = (0..partitions).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(SHUFFLE_SEED);
            parts.shuffle(&mut rng);
            self.base = Some(parts);
        }
        self.base.as_deref().expect("base populated above")
    }
}
