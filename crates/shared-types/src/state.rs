//! # Materialized State
//!
//! Key/value state reconstructed by applying an ordered block sequence onto
//! a base snapshot. The root computed here stands in for the state trie:
//! it commits to the state index and every entry, so two states share a
//! root only when they are identical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::entities::{Block, Hash, L1Commitment, Mutations, StateIndex};
use crate::errors::ChainError;

/// Computes the commitment root of a key/value state at `index`.
pub fn compute_trie_root(index: StateIndex, kv: &BTreeMap<Vec<u8>, Vec<u8>>) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(index.to_le_bytes());
    for (key, value) in kv {
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key);
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    hasher.finalize().into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    block_index: StateIndex,
    kv: BTreeMap<Vec<u8>, Vec<u8>>,
    trie_root: Hash,
}

impl State {
    /// The empty state the origin block is applied onto.
    pub fn empty() -> Self {
        let kv = BTreeMap::new();
        Self {
            block_index: 0,
            trie_root: compute_trie_root(0, &kv),
            kv,
        }
    }

    /// State produced by the origin block.
    pub fn origin() -> Self {
        Self::empty()
    }

    pub fn block_index(&self) -> StateIndex {
        self.block_index
    }

    pub fn trie_root(&self) -> &Hash {
        &self.trie_root
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.kv.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.kv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kv.is_empty()
    }

    fn with_mutations(&self, index: StateIndex, mutations: &Mutations) -> Self {
        let mut kv = self.kv.clone();
        for (key, value) in &mutations.sets {
            kv.insert(key.clone(), value.clone());
        }
        for key in &mutations.dels {
            kv.remove(key);
        }
        Self {
            block_index: index,
            trie_root: compute_trie_root(index, &kv),
            kv,
        }
    }

    /// Applies `block` onto this state.
    ///
    /// The block's previous commitment must point at this state's root, its
    /// index must be the next one (0 for the origin block), and the resulting
    /// root must equal the root the block claims.
    pub fn apply_block(&self, block: &Block) -> Result<State, ChainError> {
        let expected_index = match block.previous_l1_commitment() {
            Some(previous) => {
                if previous.trie_root != self.trie_root {
                    return Err(ChainError::PreviousCommitmentMismatch {
                        expected: hex::encode(previous.trie_root),
                        actual: hex::encode(self.trie_root),
                    });
                }
                self.block_index + 1
            }
            None => 0,
        };
        if block.state_index() != expected_index {
            return Err(ChainError::StateIndexMismatch {
                expected: expected_index,
                actual: block.state_index(),
            });
        }
        let next = self.with_mutations(block.state_index(), block.mutations());
        if next.trie_root != *block.trie_root() {
            return Err(ChainError::TrieRootMismatch {
                index: block.state_index(),
                expected: hex::encode(block.trie_root()),
                actual: hex::encode(next.trie_root),
            });
        }
        Ok(next)
    }

    /// Turns a draft built on top of this state into a block and the state it
    /// produces.
    pub fn commit_draft(&self, draft: StateDraft) -> Result<(Block, State), ChainError> {
        if draft.base_commitment.trie_root != self.trie_root {
            return Err(ChainError::DraftBaseMismatch {
                expected: hex::encode(draft.base_commitment.trie_root),
                actual: hex::encode(self.trie_root),
            });
        }
        if draft.base_index != self.block_index {
            return Err(ChainError::StateIndexMismatch {
                expected: self.block_index,
                actual: draft.base_index,
            });
        }
        let index = self.block_index + 1;
        let next = self.with_mutations(index, &draft.mutations);
        let block = Block::new(
            index,
            Some(draft.base_commitment),
            draft.mutations,
            next.trie_root,
        );
        Ok((block, next))
    }
}

/// Uncommitted changes produced on top of a known state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDraft {
    base_commitment: L1Commitment,
    base_index: StateIndex,
    mutations: Mutations,
}

impl StateDraft {
    pub fn new(base_commitment: L1Commitment, base_index: StateIndex) -> Self {
        Self {
            base_commitment,
            base_index,
            mutations: Mutations::new(),
        }
    }

    pub fn with_mutations(
        base_commitment: L1Commitment,
        base_index: StateIndex,
        mutations: Mutations,
    ) -> Self {
        Self {
            base_commitment,
            base_index,
            mutations,
        }
    }

    pub fn base_commitment(&self) -> &L1Commitment {
        &self.base_commitment
    }

    pub fn base_index(&self) -> StateIndex {
        self.base_index
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.mutations.set(key, value);
    }

    pub fn del(&mut self, key: impl Into<Vec<u8>>) {
        self.mutations.del(key);
    }
}
