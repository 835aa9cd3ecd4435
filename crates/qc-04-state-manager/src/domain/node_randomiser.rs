//! Random selection of peers to query for missing blocks.
//!
//! Ids are served from a permutation that is walked with a cursor and
//! reshuffled once exhausted, so consecutive queries spread over the whole
//! peer set before any peer is asked twice.

use std::collections::HashSet;

use rand::rngs::{OsRng, StdRng};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared_types::NodeId;
use tracing::warn;

#[derive(Debug)]
pub struct NodeRandomiser {
    me: NodeId,
    node_ids: Vec<NodeId>,
    permutation: Vec<usize>,
    cursor: usize,
    rng: StdRng,
    initted: bool,
}

impl NodeRandomiser {
    /// Creates a randomiser seeded from OS entropy.
    ///
    /// Falls back to a seed derived from `me` when OS entropy is not
    /// available. Selection stays correct, only the spread of queries over
    /// peers becomes predictable.
    pub fn new(me: NodeId) -> Self {
        let rng = match StdRng::from_rng(OsRng) {
            Ok(rng) => rng,
            Err(e) => {
                warn!(
                    "[qc-04] Secure randomness unavailable ({}), using insecure permutation for node {}",
                    e, me
                );
                StdRng::seed_from_u64(insecure_seed(&me))
            }
        };
        Self::with_rng(me, rng)
    }

    /// Creates a randomiser with a fixed seed, for reproducible selection.
    pub fn with_seed(me: NodeId, seed: u64) -> Self {
        Self::with_rng(me, StdRng::seed_from_u64(seed))
    }

    fn with_rng(me: NodeId, rng: StdRng) -> Self {
        Self {
            me,
            node_ids: Vec::new(),
            permutation: Vec::new(),
            cursor: 0,
            rng,
            initted: false,
        }
    }

    /// Replaces the peer set. Duplicates and this node's own id are dropped.
    pub fn update_node_ids(&mut self, node_ids: impl IntoIterator<Item = NodeId>) {
        let mut seen = HashSet::new();
        self.node_ids = node_ids
            .into_iter()
            .filter(|id| *id != self.me && seen.insert(id.clone()))
            .collect();
        self.permutation = (0..self.node_ids.len()).collect();
        self.permutation.shuffle(&mut self.rng);
        self.cursor = 0;
        self.initted = true;
    }

    pub fn is_initted(&self) -> bool {
        self.initted
    }

    /// Peers other than this node, in the order they were supplied.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    /// Returns up to `count` distinct peers, never this node.
    ///
    /// Returns nothing until the peer set has been supplied.
    pub fn get_random_other_node_ids(&mut self, count: usize) -> Vec<NodeId> {
        if !self.initted {
            warn!("[qc-04] Node randomiser used before the peer set is known");
            return Vec::new();
        }
        let count = count.min(self.node_ids.len());
        let mut taken = HashSet::with_capacity(count);
        let mut result = Vec::with_capacity(count);
        while result.len() < count {
            if self.cursor >= self.permutation.len() {
                self.permutation.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            let index = self.permutation[self.cursor];
            self.cursor += 1;
            if taken.insert(index) {
                result.push(self.node_ids[index].clone());
            }
        }
        result
    }
}

fn insecure_seed(me: &NodeId) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&me.0[..8]);
    u64::from_le_bytes(bytes)
}
