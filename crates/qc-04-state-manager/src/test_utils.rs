//! # Test Utilities
//!
//! Deterministic chain builders for unit and integration tests.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_types::{AliasOutputWithId, Block, L1Commitment, NodeId, State, StateDraft};

/// Builds random but reproducible chains and remembers the state each block
/// produces.
pub struct BlockFactory {
    rng: StdRng,
    states: HashMap<L1Commitment, State>,
}

impl BlockFactory {
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    pub fn with_seed(seed: u64) -> Self {
        let mut states = HashMap::new();
        states.insert(L1Commitment::origin(), State::origin());
        Self {
            rng: StdRng::seed_from_u64(seed),
            states,
        }
    }

    /// Builds `count` consecutive blocks on top of the block of `from`, which
    /// must be the origin or a block built by this factory.
    pub fn blocks(&mut self, count: usize, from: &L1Commitment) -> Vec<Block> {
        let mut result = Vec::with_capacity(count);
        let mut commitment = *from;
        for _ in 0..count {
            let draft = self.random_draft(&commitment);
            let block = self.commit(draft);
            commitment = block.l1_commitment();
            result.push(block);
        }
        result
    }

    /// State produced by the block of `commitment`.
    ///
    /// Panics for blocks this factory did not build.
    pub fn state(&self, commitment: &L1Commitment) -> State {
        self.states
            .get(commitment)
            .cloned()
            .unwrap_or_else(|| panic!("unknown commitment {:?}", commitment))
    }

    /// Random draft on top of `block`, as produced by consensus.
    pub fn draft_for(&mut self, block: &Block) -> StateDraft {
        self.random_draft(&block.l1_commitment())
    }

    /// Ledger output confirming `block`.
    pub fn alias_output(&self, block: &Block) -> AliasOutputWithId {
        let commitment = block.l1_commitment();
        AliasOutputWithId::new(commitment.block_hash.0, block.state_index(), &commitment)
    }

    fn random_draft(&mut self, base: &L1Commitment) -> StateDraft {
        let base_state = self.state(base);
        let mut draft = StateDraft::new(*base, base_state.block_index());
        for _ in 0..self.rng.gen_range(1..=3) {
            let key: u8 = self.rng.gen_range(0..32);
            let value: u64 = self.rng.gen();
            draft.set(vec![b'k', key], value.to_le_bytes().to_vec());
        }
        if self.rng.gen_bool(0.3) {
            let key: u8 = self.rng.gen_range(0..32);
            draft.del(vec![b'k', key]);
        }
        draft
    }

    fn commit(&mut self, draft: StateDraft) -> Block {
        let base = self.state(draft.base_commitment());
        let (block, state) = base
            .commit_draft(draft)
            .unwrap_or_else(|e| panic!("factory draft rejected: {e}"));
        self.states.insert(block.l1_commitment(), state);
        block
    }
}

impl Default for BlockFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Node id `[val; 32]`.
pub fn node_id(val: u8) -> NodeId {
    NodeId::new([val; 32])
}

/// Node ids `1..=count`.
pub fn node_ids(count: u8) -> Vec<NodeId> {
    (1..=count).map(node_id).collect()
}
