//! # Core Chain Entities
//!
//! Defines the hash-linked block model shared by every subsystem that
//! needs to reason about a chain's history.
//!
//! ## Clusters
//!
//! - **Identity**: `Hash`, `NodeId`, `ChainId`, `BlockHash`
//! - **Chain**: `Block`, `Mutations`, `L1Commitment`
//! - **Ledger anchors**: `AliasOutputWithId`

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::errors::ChainError;

// =============================================================================
// IDENTITY
// =============================================================================

/// A 32-byte SHA3-256 digest.
pub type Hash = [u8; 32];

/// Position of a block (and of the state it produces) in its chain.
pub type StateIndex = u32;

/// Unique identifier for a node in the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

/// A peer identifier (alias for `NodeId` in peer contexts).
pub type PeerId = NodeId;

impl NodeId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

/// Identifier of a chain; scopes the peering namespace of its subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ChainId(pub Hash);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Content hash of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct BlockHash(pub Hash);

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// =============================================================================
// CHAIN
// =============================================================================

/// Commitment to "state as of block N": the block's hash together with the
/// root of the state trie it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct L1Commitment {
    /// Root of the state trie after applying the block.
    pub trie_root: Hash,
    /// Hash of the block.
    pub block_hash: BlockHash,
}

impl L1Commitment {
    /// Size of the binary encoding carried in alias output metadata.
    pub const ENCODED_LEN: usize = 64;

    pub fn new(trie_root: Hash, block_hash: BlockHash) -> Self {
        Self {
            trie_root,
            block_hash,
        }
    }

    /// Commitment of the deterministic origin block.
    pub fn origin() -> Self {
        Block::origin().l1_commitment()
    }

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..32].copy_from_slice(&self.trie_root);
        out[32..].copy_from_slice(&self.block_hash.0);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(ChainError::InvalidCommitmentBytes { len: bytes.len() });
        }
        let mut trie_root = [0u8; 32];
        let mut block_hash = [0u8; 32];
        trie_root.copy_from_slice(&bytes[..32]);
        block_hash.copy_from_slice(&bytes[32..]);
        Ok(Self::new(trie_root, BlockHash(block_hash)))
    }
}

impl fmt::Display for L1Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{};{}>",
            self.block_hash,
            hex::encode(&self.trie_root[..8])
        )
    }
}

/// Key/value changes carried by a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Mutations {
    pub sets: BTreeMap<Vec<u8>, Vec<u8>>,
    pub dels: BTreeSet<Vec<u8>>,
}

impl Mutations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        self.dels.remove(&key);
        self.sets.insert(key, value.into());
    }

    pub fn del(&mut self, key: impl Into<Vec<u8>>) {
        let key = key.into();
        self.sets.remove(&key);
        self.dels.insert(key);
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.dels.is_empty()
    }

    fn hash_into(&self, hasher: &mut Sha3_256) {
        hasher.update((self.sets.len() as u64).to_le_bytes());
        for (key, value) in &self.sets {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key);
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value);
        }
        hasher.update((self.dels.len() as u64).to_le_bytes());
        for key in &self.dels {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key);
        }
    }
}

/// Immutable unit of state transition.
///
/// Blocks are content addressed: the hash covers the index, the previous
/// commitment and the mutations. `previous_l1_commitment` links every block
/// to its predecessor; only the origin block has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    state_index: StateIndex,
    previous_l1_commitment: Option<L1Commitment>,
    mutations: Mutations,
    trie_root: Hash,
}

impl Block {
    pub fn new(
        state_index: StateIndex,
        previous_l1_commitment: Option<L1Commitment>,
        mutations: Mutations,
        trie_root: Hash,
    ) -> Self {
        Self {
            state_index,
            previous_l1_commitment,
            mutations,
            trie_root,
        }
    }

    /// The origin block: index 0, no predecessor, no mutations.
    pub fn origin() -> Self {
        let mutations = Mutations::new();
        let trie_root = crate::state::compute_trie_root(0, &BTreeMap::new());
        Self::new(0, None, mutations, trie_root)
    }

    pub fn state_index(&self) -> StateIndex {
        self.state_index
    }

    pub fn previous_l1_commitment(&self) -> Option<&L1Commitment> {
        self.previous_l1_commitment.as_ref()
    }

    pub fn mutations(&self) -> &Mutations {
        &self.mutations
    }

    /// Trie root the block claims to produce.
    pub fn trie_root(&self) -> &Hash {
        &self.trie_root
    }

    pub fn is_origin(&self) -> bool {
        self.previous_l1_commitment.is_none()
    }

    pub fn hash(&self) -> BlockHash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.state_index.to_le_bytes());
        match &self.previous_l1_commitment {
            Some(previous) => {
                hasher.update([1u8]);
                hasher.update(previous.to_bytes());
            }
            None => hasher.update([0u8]),
        }
        self.mutations.hash_into(&mut hasher);
        BlockHash(hasher.finalize().into())
    }

    pub fn l1_commitment(&self) -> L1Commitment {
        L1Commitment::new(self.trie_root, self.hash())
    }
}

// =============================================================================
// LEDGER ANCHORS
// =============================================================================

/// Ledger output pointing at the chain's latest confirmed state.
///
/// The state metadata carries the encoded `L1Commitment` of that state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasOutputWithId {
    pub output_id: Hash,
    pub state_index: StateIndex,
    pub state_metadata: Vec<u8>,
}

impl AliasOutputWithId {
    pub fn new(output_id: Hash, state_index: StateIndex, commitment: &L1Commitment) -> Self {
        Self {
            output_id,
            state_index,
            state_metadata: commitment.to_bytes().to_vec(),
        }
    }

    pub fn l1_commitment(&self) -> Result<L1Commitment, ChainError> {
        L1Commitment::from_bytes(&self.state_metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_of(parent: &Block, key: &str) -> Block {
        let mut mutations = Mutations::new();
        mutations.set(key.as_bytes(), b"v".to_vec());
        Block::new(
            parent.state_index() + 1,
            Some(parent.l1_commitment()),
            mutations,
            [7u8; 32],
        )
    }

    #[test]
    fn test_origin_is_deterministic() {
        assert_eq!(Block::origin().hash(), Block::origin().hash());
        assert!(Block::origin().is_origin());
        assert_eq!(L1Commitment::origin(), Block::origin().l1_commitment());
    }

    #[test]
    fn test_hash_depends_on_previous_commitment() {
        let origin = Block::origin();
        let a = child_of(&origin, "k");
        let b = child_of(&a, "k");
        let c = Block::new(2, Some(origin.l1_commitment()), b.mutations().clone(), [7u8; 32]);
        assert_ne!(b.hash(), c.hash());
    }

    #[test]
    fn test_hash_ignores_claimed_trie_root() {
        let origin = Block::origin();
        let a = child_of(&origin, "k");
        let forged = Block::new(1, Some(origin.l1_commitment()), a.mutations().clone(), [9u8; 32]);
        assert_eq!(a.hash(), forged.hash());
        assert_ne!(a.l1_commitment(), forged.l1_commitment());
    }

    #[test]
    fn test_alias_output_rejects_malformed_metadata() {
        let mut output = AliasOutputWithId::new([1u8; 32], 3, &L1Commitment::origin());
        assert_eq!(output.l1_commitment().unwrap(), L1Commitment::origin());

        output.state_metadata.truncate(10);
        assert!(matches!(
            output.l1_commitment(),
            Err(ChainError::InvalidCommitmentBytes { len: 10 })
        ));
    }

    #[test]
    fn test_mutations_set_then_del() {
        let mut mutations = Mutations::new();
        mutations.set(b"a".to_vec(), b"1".to_vec());
        mutations.del(b"a".to_vec());
        assert!(mutations.sets.is_empty());
        assert!(mutations.dels.contains(&b"a".to_vec()));
    }
}
