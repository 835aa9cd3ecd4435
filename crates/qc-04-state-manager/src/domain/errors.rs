use shared_types::{BlockHash, ChainError, Hash, L1Commitment, StateIndex};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateManagerError {
    #[error("Block not found: {commitment}")]
    BlockNotFound { commitment: L1Commitment },

    #[error("State not found for trie root {}", hex::encode(.trie_root))]
    StateNotFound { trie_root: Hash },

    #[error("Block {block_hash} does not match commitment {commitment}")]
    BlockCommitmentMismatch {
        block_hash: BlockHash,
        commitment: L1Commitment,
    },

    #[error("Block {block_hash} has index {index}, expected {expected}")]
    UnexpectedBlockIndex {
        block_hash: BlockHash,
        index: StateIndex,
        expected: StateIndex,
    },

    #[error("Index {index} is outside the chain ending at {tip_index}")]
    IndexOutOfRange { index: StateIndex, tip_index: StateIndex },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u16),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Request already completed")]
    AlreadyCompleted,

    #[error(transparent)]
    Chain(#[from] ChainError),
}
