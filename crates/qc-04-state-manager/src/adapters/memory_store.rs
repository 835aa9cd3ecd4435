use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use shared_types::{Block, BlockHash, Hash, L1Commitment, State, StateIndex};

use crate::domain::StateManagerError;
use crate::ports::BlockStore;

/// In-memory implementation of `BlockStore` for testing and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<BlockHash, Block>>,
    states: RwLock<HashMap<Hash, State>>,
    latest: RwLock<Option<L1Commitment>>,
    largest_pruned: RwLock<Option<StateIndex>>,
    /// When set, every commit fails.
    fail_commits: AtomicBool,
}

impl InMemoryBlockStore {
    /// Store holding the origin block and state.
    pub fn new() -> Self {
        let store = Self::empty();
        let origin = Block::origin();
        store.blocks.write().insert(origin.hash(), origin);
        let state = State::origin();
        store.states.write().insert(*state.trie_root(), state);
        store
    }

    /// Store holding nothing, not even the origin.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of committed blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Makes every following commit fail, or succeed again.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl BlockStore for InMemoryBlockStore {
    fn has_block(&self, commitment: &L1Commitment) -> bool {
        let has_block = self
            .blocks
            .read()
            .get(&commitment.block_hash)
            .is_some_and(|b| *b.trie_root() == commitment.trie_root);
        has_block && self.states.read().contains_key(&commitment.trie_root)
    }

    fn block(&self, commitment: &L1Commitment) -> Result<Block, StateManagerError> {
        self.blocks
            .read()
            .get(&commitment.block_hash)
            .filter(|b| *b.trie_root() == commitment.trie_root)
            .cloned()
            .ok_or(StateManagerError::BlockNotFound {
                commitment: *commitment,
            })
    }

    fn state(&self, commitment: &L1Commitment) -> Result<State, StateManagerError> {
        self.states
            .read()
            .get(&commitment.trie_root)
            .cloned()
            .ok_or(StateManagerError::StateNotFound {
                trie_root: commitment.trie_root,
            })
    }

    fn commit(&self, block: &Block, state: &State) -> Result<(), StateManagerError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StateManagerError::Store(format!(
                "commit of block {} refused",
                block.hash()
            )));
        }
        if block.trie_root() != state.trie_root() {
            return Err(StateManagerError::Store(format!(
                "block {} does not produce the supplied state",
                block.hash()
            )));
        }
        self.states.write().insert(*state.trie_root(), state.clone());
        self.blocks.write().insert(block.hash(), block.clone());
        Ok(())
    }

    fn set_latest(&self, commitment: &L1Commitment) -> Result<(), StateManagerError> {
        if !self.has_block(commitment) {
            return Err(StateManagerError::BlockNotFound {
                commitment: *commitment,
            });
        }
        *self.latest.write() = Some(*commitment);
        Ok(())
    }

    fn latest(&self) -> Option<L1Commitment> {
        *self.latest.read()
    }

    fn prune(&self, commitment: &L1Commitment) -> Result<(), StateManagerError> {
        let block = self.block(commitment)?;
        self.blocks.write().remove(&commitment.block_hash);
        self.states.write().remove(&commitment.trie_root);
        let mut largest = self.largest_pruned.write();
        if largest.map_or(true, |index| block.state_index() > index) {
            *largest = Some(block.state_index());
        }
        Ok(())
    }

    fn largest_pruned_block_index(&self) -> Option<StateIndex> {
        *self.largest_pruned.read()
    }
}
