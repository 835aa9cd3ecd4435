//! # Error Types
//!
//! Defines error types for chain primitives shared across subsystems.

use thiserror::Error;

use crate::entities::StateIndex;

/// Errors raised while decoding or applying chain data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Alias output metadata does not hold an encoded commitment.
    #[error("Invalid L1 commitment encoding: {len} bytes")]
    InvalidCommitmentBytes { len: usize },

    /// A block was applied onto a state it does not extend.
    #[error("Previous commitment mismatch: block expects root {expected}, state has {actual}")]
    PreviousCommitmentMismatch { expected: String, actual: String },

    /// Applying a block produced a root other than the one it claims.
    #[error("Trie root mismatch at index {index}: block claims {expected}, got {actual}")]
    TrieRootMismatch {
        index: StateIndex,
        expected: String,
        actual: String,
    },

    /// A block or draft does not step exactly one index past the state it
    /// extends.
    #[error("State index mismatch: expected {expected}, got {actual}")]
    StateIndexMismatch {
        expected: StateIndex,
        actual: StateIndex,
    },

    /// A state draft was committed on top of a different base state.
    #[error("Draft base mismatch: draft expects root {expected}, state has {actual}")]
    DraftBaseMismatch { expected: String, actual: String },

    /// An envelope payload could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),
}
