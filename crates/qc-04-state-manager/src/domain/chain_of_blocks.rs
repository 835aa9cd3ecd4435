//! # Chain Of Blocks
//!
//! Lazily loaded suffix of a committed chain. Starting from its tip, older
//! blocks are read from the store only when an index below the known suffix
//! is asked for. Peers are never consulted: every block from the tip down to
//! the origin must already be committed.

use std::collections::VecDeque;

use shared_types::{Block, L1Commitment, StateIndex};
use tracing::warn;

use crate::domain::errors::StateManagerError;
use crate::ports::BlockStore;

pub struct ChainOfBlocks<'a, S: BlockStore + ?Sized> {
    store: &'a S,
    /// Known suffix, increasing index; the back is the tip.
    blocks: VecDeque<Block>,
}

impl<'a, S: BlockStore + ?Sized> ChainOfBlocks<'a, S> {
    pub fn new(store: &'a S, tip: &L1Commitment) -> Result<Self, StateManagerError> {
        let block = load_block(store, tip)?;
        Ok(Self {
            store,
            blocks: VecDeque::from([block]),
        })
    }

    pub fn tip_index(&self) -> StateIndex {
        self.blocks.back().map(Block::state_index).unwrap_or_default()
    }

    /// Lowest index loaded so far.
    pub fn base_index(&self) -> StateIndex {
        self.blocks.front().map(Block::state_index).unwrap_or_default()
    }

    pub fn get_l1_commitment(&mut self, index: StateIndex) -> Result<L1Commitment, StateManagerError> {
        self.extend_to(index)?;
        let offset = (index - self.base_index()) as usize;
        self.blocks
            .get(offset)
            .map(Block::l1_commitment)
            .ok_or(StateManagerError::IndexOutOfRange {
                index,
                tip_index: self.tip_index(),
            })
    }

    /// Blocks strictly after `index` up to the tip, increasing index.
    pub fn get_blocks_from(&mut self, index: StateIndex) -> Result<Vec<Block>, StateManagerError> {
        if index >= self.tip_index() {
            return Ok(Vec::new());
        }
        self.extend_to(index + 1)?;
        let offset = (index + 1 - self.base_index()) as usize;
        Ok(self.blocks.iter().skip(offset).cloned().collect())
    }

    /// Loads blocks until `index` is known. Every loaded block must sit
    /// exactly one index below the block it precedes.
    fn extend_to(&mut self, index: StateIndex) -> Result<(), StateManagerError> {
        let tip_index = self.tip_index();
        if index > tip_index {
            return Err(StateManagerError::IndexOutOfRange { index, tip_index });
        }
        while self.base_index() > index {
            let previous = match self.blocks.front().and_then(Block::previous_l1_commitment) {
                Some(previous) => *previous,
                None => return Err(StateManagerError::IndexOutOfRange { index, tip_index }),
            };
            let block = load_block(self.store, &previous)?;
            let expected = self.base_index() - 1;
            if block.state_index() != expected {
                return Err(StateManagerError::UnexpectedBlockIndex {
                    block_hash: block.hash(),
                    index: block.state_index(),
                    expected,
                });
            }
            self.blocks.push_front(block);
        }
        Ok(())
    }
}

/// Index of the last block the two chains share.
///
/// Commitments are compared from the lower tip downward. Index 0 is
/// returned when nothing above the origin matches.
pub fn common_ancestor_index<S: BlockStore + ?Sized>(
    old: &mut ChainOfBlocks<'_, S>,
    new: &mut ChainOfBlocks<'_, S>,
) -> Result<StateIndex, StateManagerError> {
    let mut index = old.tip_index().min(new.tip_index());
    loop {
        if old.get_l1_commitment(index)? == new.get_l1_commitment(index)? {
            return Ok(index);
        }
        if index == 0 {
            warn!("[qc-04] Chains do not share an origin block");
            return Ok(0);
        }
        index -= 1;
    }
}

fn load_block<S: BlockStore + ?Sized>(
    store: &S,
    commitment: &L1Commitment,
) -> Result<Block, StateManagerError> {
    let block = store.block(commitment)?;
    if block.l1_commitment() != *commitment {
        return Err(StateManagerError::BlockCommitmentMismatch {
            block_hash: block.hash(),
            commitment: *commitment,
        });
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{State, StateDraft};

    use crate::adapters::InMemoryBlockStore;
    use crate::test_utils::BlockFactory;

    /// Commits a 6 block trunk and two branches of 3 blocks forking at index 4.
    fn forked_store() -> (InMemoryBlockStore, BlockFactory, Vec<Block>, Vec<Block>, Vec<Block>) {
        let mut factory = BlockFactory::with_seed(11);
        let trunk = factory.blocks(6, &L1Commitment::origin());
        let fork_point = trunk[3].l1_commitment();
        let old_branch = factory.blocks(3, &fork_point);
        let new_branch = factory.blocks(3, &fork_point);

        let store = InMemoryBlockStore::new();
        for block in trunk.iter().chain(&old_branch).chain(&new_branch) {
            store
                .commit(block, &factory.state(&block.l1_commitment()))
                .unwrap();
        }
        (store, factory, trunk, old_branch, new_branch)
    }

    #[test]
    fn test_commitments_loaded_lazily_down_to_origin() {
        let (store, _, trunk, _, _) = forked_store();
        let mut chain = ChainOfBlocks::new(&store, &trunk[5].l1_commitment()).unwrap();
        assert_eq!(chain.tip_index(), 6);
        assert_eq!(chain.base_index(), 6);

        assert_eq!(chain.get_l1_commitment(3).unwrap(), trunk[2].l1_commitment());
        assert_eq!(chain.base_index(), 3);
        assert_eq!(chain.get_l1_commitment(0).unwrap(), L1Commitment::origin());
        assert!(matches!(
            chain.get_l1_commitment(7),
            Err(StateManagerError::IndexOutOfRange { index: 7, tip_index: 6 })
        ));
    }

    #[test]
    fn test_blocks_from_is_exclusive() {
        let (store, _, trunk, _, _) = forked_store();
        let mut chain = ChainOfBlocks::new(&store, &trunk[5].l1_commitment()).unwrap();

        assert_eq!(chain.get_blocks_from(3).unwrap(), trunk[3..].to_vec());
        assert_eq!(chain.get_blocks_from(0).unwrap(), trunk);
        assert!(chain.get_blocks_from(6).unwrap().is_empty());
    }

    #[test]
    fn test_common_ancestor_of_branches() {
        let (store, _, _, old_branch, new_branch) = forked_store();
        let mut old = ChainOfBlocks::new(&store, &old_branch[2].l1_commitment()).unwrap();
        let mut new = ChainOfBlocks::new(&store, &new_branch[2].l1_commitment()).unwrap();

        assert_eq!(common_ancestor_index(&mut old, &mut new).unwrap(), 4);
        assert_eq!(old.get_blocks_from(4).unwrap(), old_branch);
        assert_eq!(new.get_blocks_from(4).unwrap(), new_branch);
    }

    #[test]
    fn test_common_ancestor_of_prefix_is_lower_tip() {
        let (store, _, trunk, _, _) = forked_store();
        let mut old = ChainOfBlocks::new(&store, &trunk[2].l1_commitment()).unwrap();
        let mut new = ChainOfBlocks::new(&store, &trunk[5].l1_commitment()).unwrap();

        assert_eq!(common_ancestor_index(&mut old, &mut new).unwrap(), 3);
        assert!(old.get_blocks_from(3).unwrap().is_empty());
        assert_eq!(new.get_blocks_from(3).unwrap(), trunk[3..].to_vec());
    }

    #[test]
    fn test_block_skipping_indices_is_an_error() {
        let store = InMemoryBlockStore::new();
        let mut draft = StateDraft::new(L1Commitment::origin(), 0);
        draft.set(b"k".to_vec(), b"v".to_vec());
        let (block, state) = State::origin().commit_draft(draft).unwrap();
        // Claims index 6 while its parent is the origin.
        let gapped = Block::new(
            6,
            block.previous_l1_commitment().copied(),
            block.mutations().clone(),
            *state.trie_root(),
        );
        store.commit(&gapped, &state).unwrap();

        let mut chain = ChainOfBlocks::new(&store, &gapped.l1_commitment()).unwrap();
        assert!(matches!(
            chain.get_l1_commitment(3),
            Err(StateManagerError::UnexpectedBlockIndex {
                index: 0,
                expected: 5,
                ..
            })
        ));
        assert!(chain.get_blocks_from(0).is_err());
        assert_eq!(chain.get_l1_commitment(6).unwrap(), gapped.l1_commitment());
    }

    #[test]
    fn test_missing_block_is_an_error() {
        let (_, mut factory, _, _, _) = forked_store();
        let store = InMemoryBlockStore::new();
        let orphan = factory.blocks(2, &L1Commitment::origin());
        store
            .commit(&orphan[1], &factory.state(&orphan[1].l1_commitment()))
            .unwrap();

        let mut chain = ChainOfBlocks::new(&store, &orphan[1].l1_commitment()).unwrap();
        assert!(matches!(
            chain.get_l1_commitment(1),
            Err(StateManagerError::BlockNotFound { .. })
        ));
    }
}
