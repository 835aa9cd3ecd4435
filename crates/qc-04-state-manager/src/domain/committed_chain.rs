//! # Committed Chain
//!
//! Index and commitment of every block on the committed chain, oldest first,
//! from the latest commit back to the oldest state the store still holds.
//! Pruning deletes states from the front.
//!
//! The chain is kept across commits and updated incrementally: blocks above
//! the newest known entry are appended, and a switch of branch drops the
//! known entries above the fork.

use std::collections::VecDeque;

use shared_types::{Block, L1Commitment, StateIndex};
use tracing::debug;

use crate::domain::errors::StateManagerError;
use crate::ports::BlockStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub state_index: StateIndex,
    pub commitment: L1Commitment,
}

impl BlockInfo {
    pub fn of(block: &Block) -> Self {
        Self {
            state_index: block.state_index(),
            commitment: block.l1_commitment(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CommittedChain {
    /// Increasing index; the back is the newest block.
    blocks: VecDeque<BlockInfo>,
}

impl CommittedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn oldest(&self) -> Option<&BlockInfo> {
        self.blocks.front()
    }

    pub fn newest(&self) -> Option<&BlockInfo> {
        self.blocks.back()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockInfo> {
        self.blocks.iter()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Makes `tip` the newest entry, reusing as much of the known chain as
    /// still leads to it.
    pub fn update<S: BlockStore + ?Sized>(
        &mut self,
        store: &S,
        tip: BlockInfo,
    ) -> Result<(), StateManagerError> {
        let mut newer = VecDeque::new();
        let mut next = Some(tip);

        if let Some(last) = self.blocks.back().copied() {
            while let Some(info) = next
                .filter(|info| info.state_index > last.state_index && store.has_block(&info.commitment))
            {
                newer.push_front(info);
                next = previous_info(store, &info)?;
            }
        }

        // Known entries above `next` are on another branch.
        if let Some(info) = next {
            while self
                .blocks
                .back()
                .is_some_and(|last| last.state_index > info.state_index)
            {
                self.blocks.pop_back();
            }
        }

        // Walk both chains back in step until they meet.
        while let (Some(info), Some(last)) = (next, self.blocks.back().copied()) {
            if info.commitment == last.commitment || !store.has_block(&info.commitment) {
                break;
            }
            if info.state_index != last.state_index {
                return Err(StateManagerError::UnexpectedBlockIndex {
                    block_hash: info.commitment.block_hash,
                    index: info.state_index,
                    expected: last.state_index,
                });
            }
            newer.push_front(info);
            next = previous_info(store, &info)?;
            self.blocks.pop_back();
        }

        match (next, self.blocks.back().copied()) {
            (_, None) => {
                let mut next = next;
                while let Some(info) = next.filter(|info| store.has_block(&info.commitment)) {
                    newer.push_front(info);
                    next = previous_info(store, &info)?;
                }
                self.blocks = newer;
            }
            (Some(info), Some(last)) if info.commitment == last.commitment => {
                self.blocks.extend(newer);
                while self
                    .blocks
                    .front()
                    .is_some_and(|oldest| !store.has_block(&oldest.commitment))
                {
                    self.blocks.pop_front();
                }
                let mut previous = match self.blocks.front() {
                    Some(oldest) => previous_info(store, oldest)?,
                    None => None,
                };
                while let Some(info) = previous.filter(|info| store.has_block(&info.commitment)) {
                    self.blocks.push_front(info);
                    previous = previous_info(store, &info)?;
                }
            }
            // Origin reached, or everything older is already pruned.
            _ => self.blocks = newer,
        }
        Ok(())
    }

    /// Prunes the oldest states until `keep` remain, deleting at most
    /// `max_delete`. Stops at the first failure so that pruned states never
    /// leave gaps. Returns the number of states pruned.
    pub fn prune<S: BlockStore + ?Sized>(
        &mut self,
        store: &S,
        keep: usize,
        max_delete: usize,
    ) -> Result<usize, StateManagerError> {
        let count = self.blocks.len().saturating_sub(keep).min(max_delete);
        for _ in 0..count {
            let Some(oldest) = self.blocks.front().copied() else {
                break;
            };
            store.prune(&oldest.commitment)?;
            self.blocks.pop_front();
            debug!(
                "[qc-04] State {} of block {} pruned",
                oldest.state_index, oldest.commitment.block_hash
            );
        }
        Ok(count)
    }
}

fn previous_info<S: BlockStore + ?Sized>(
    store: &S,
    info: &BlockInfo,
) -> Result<Option<BlockInfo>, StateManagerError> {
    let block = store.block(&info.commitment)?;
    Ok(block.previous_l1_commitment().map(|previous| BlockInfo {
        state_index: block.state_index().saturating_sub(1),
        commitment: *previous,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::adapters::InMemoryBlockStore;
    use crate::test_utils::BlockFactory;

    fn commit_all(store: &InMemoryBlockStore, factory: &BlockFactory, blocks: &[Block]) {
        for block in blocks {
            store
                .commit(block, &factory.state(&block.l1_commitment()))
                .unwrap();
        }
    }

    fn indices(chain: &CommittedChain) -> Vec<StateIndex> {
        chain.blocks().map(|info| info.state_index).collect()
    }

    fn commitments(chain: &CommittedChain) -> Vec<L1Commitment> {
        chain.blocks().map(|info| info.commitment).collect()
    }

    #[test]
    fn test_new_chain_reads_full_history() {
        let mut factory = BlockFactory::with_seed(21);
        let blocks = factory.blocks(8, &L1Commitment::origin());
        let store = InMemoryBlockStore::new();
        commit_all(&store, &factory, &blocks);

        let mut chain = CommittedChain::new();
        chain.update(&store, BlockInfo::of(&blocks[7])).unwrap();
        assert_eq!(indices(&chain), (0..=8).collect::<Vec<_>>());
        assert_eq!(chain.oldest().map(|b| b.commitment), Some(L1Commitment::origin()));
        assert_eq!(chain.newest(), Some(&BlockInfo::of(&blocks[7])));
    }

    #[test]
    fn test_new_chain_stops_at_pruned_history() {
        let mut factory = BlockFactory::with_seed(22);
        let blocks = factory.blocks(8, &L1Commitment::origin());
        let store = InMemoryBlockStore::new();
        commit_all(&store, &factory, &blocks);
        store.prune(&L1Commitment::origin()).unwrap();
        for block in &blocks[..3] {
            store.prune(&block.l1_commitment()).unwrap();
        }

        let mut chain = CommittedChain::new();
        chain.update(&store, BlockInfo::of(&blocks[7])).unwrap();
        assert_eq!(indices(&chain), (4..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_newer_blocks_are_appended() {
        let mut factory = BlockFactory::with_seed(23);
        let blocks = factory.blocks(10, &L1Commitment::origin());
        let store = InMemoryBlockStore::new();
        commit_all(&store, &factory, &blocks[..5]);

        let mut chain = CommittedChain::new();
        chain.update(&store, BlockInfo::of(&blocks[4])).unwrap();
        assert_eq!(chain.len(), 6);

        commit_all(&store, &factory, &blocks[5..]);
        chain.update(&store, BlockInfo::of(&blocks[9])).unwrap();
        let mut expected = vec![L1Commitment::origin()];
        expected.extend(blocks.iter().map(Block::l1_commitment));
        assert_eq!(commitments(&chain), expected);

        // Same tip again changes nothing.
        chain.update(&store, BlockInfo::of(&blocks[9])).unwrap();
        assert_eq!(chain.len(), 11);
    }

    #[test]
    fn test_entries_pruned_elsewhere_are_dropped() {
        let mut factory = BlockFactory::with_seed(24);
        let blocks = factory.blocks(6, &L1Commitment::origin());
        let store = InMemoryBlockStore::new();
        commit_all(&store, &factory, &blocks[..3]);

        let mut chain = CommittedChain::new();
        chain.update(&store, BlockInfo::of(&blocks[2])).unwrap();
        store.prune(&L1Commitment::origin()).unwrap();
        store.prune(&blocks[0].l1_commitment()).unwrap();

        commit_all(&store, &factory, &blocks[3..]);
        chain.update(&store, BlockInfo::of(&blocks[5])).unwrap();
        assert_eq!(indices(&chain), (2..=6).collect::<Vec<_>>());
    }

    #[test]
    fn test_branch_switch_replaces_known_tail() {
        let mut factory = BlockFactory::with_seed(25);
        let trunk = factory.blocks(4, &L1Commitment::origin());
        let old_branch = factory.blocks(4, &trunk[3].l1_commitment());
        let new_branch = factory.blocks(2, &trunk[3].l1_commitment());
        let store = InMemoryBlockStore::new();
        commit_all(&store, &factory, &trunk);
        commit_all(&store, &factory, &old_branch);

        let mut chain = CommittedChain::new();
        chain.update(&store, BlockInfo::of(&old_branch[3])).unwrap();
        assert_eq!(chain.len(), 9);

        commit_all(&store, &factory, &new_branch);
        chain.update(&store, BlockInfo::of(&new_branch[1])).unwrap();
        let mut expected = vec![L1Commitment::origin()];
        expected.extend(trunk.iter().chain(&new_branch).map(Block::l1_commitment));
        assert_eq!(commitments(&chain), expected);
    }

    #[test]
    fn test_prune_keeps_newest_states() {
        let mut factory = BlockFactory::with_seed(26);
        let blocks = factory.blocks(7, &L1Commitment::origin());
        let store = InMemoryBlockStore::new();
        commit_all(&store, &factory, &blocks);
        let mut chain = CommittedChain::new();
        chain.update(&store, BlockInfo::of(&blocks[6])).unwrap();

        assert_eq!(chain.prune(&store, 3, 100).unwrap(), 5);
        assert_eq!(indices(&chain), vec![5, 6, 7]);
        assert!(!store.has_block(&blocks[3].l1_commitment()));
        assert!(store.has_block(&blocks[4].l1_commitment()));
        assert_eq!(store.largest_pruned_block_index(), Some(4));

        assert_eq!(chain.prune(&store, 3, 100).unwrap(), 0);
        assert_eq!(chain.prune(&store, 10, 100).unwrap(), 0);
    }

    #[test]
    fn test_prune_deletes_at_most_max_per_call() {
        let mut factory = BlockFactory::with_seed(27);
        let blocks = factory.blocks(9, &L1Commitment::origin());
        let store = InMemoryBlockStore::new();
        commit_all(&store, &factory, &blocks);
        let mut chain = CommittedChain::new();
        chain.update(&store, BlockInfo::of(&blocks[8])).unwrap();

        assert_eq!(chain.prune(&store, 2, 3).unwrap(), 3);
        assert_eq!(chain.oldest().map(|b| b.state_index), Some(3));
        assert_eq!(chain.prune(&store, 2, 3).unwrap(), 3);
        assert_eq!(chain.prune(&store, 2, 3).unwrap(), 2);
        assert_eq!(indices(&chain), vec![8, 9]);
        assert_eq!(store.block_count(), 2);
    }

    #[test]
    fn test_prune_failure_stops_pruning() {
        let mut factory = BlockFactory::with_seed(28);
        let blocks = factory.blocks(4, &L1Commitment::origin());
        let store = InMemoryBlockStore::new();
        commit_all(&store, &factory, &blocks);
        let mut chain = CommittedChain::new();
        chain.update(&store, BlockInfo::of(&blocks[3])).unwrap();
        // Deleted behind the chain's back.
        store.prune(&blocks[0].l1_commitment()).unwrap();

        assert!(matches!(
            chain.prune(&store, 1, 10),
            Err(StateManagerError::BlockNotFound { .. })
        ));
        assert_eq!(indices(&chain), vec![1, 2, 3, 4]);
    }
}
