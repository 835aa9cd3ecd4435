//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the state manager requires from the host node: a clock, the
//! durable block store and the peering network.

use std::fmt::Debug;
use std::time::SystemTime;

use shared_types::{Block, L1Commitment, NodeId, PeerEnvelope, PeeringId, State, StateIndex};
use tokio::sync::mpsc;

use crate::domain::StateManagerError;

/// Source of the current time.
///
/// Every timer decision of the state manager goes through this trait so
/// tests can drive time explicitly.
pub trait TimeProvider: Send + Sync + Debug {
    fn now(&self) -> SystemTime;
}

/// Durable block repository.
///
/// Blocks are looked up by the hash in their commitment and states by the
/// trie root. A block is only reported as present once it is committed
/// together with the state it produces.
pub trait BlockStore: Send + Sync {
    /// Whether the block of `commitment` and its state are committed.
    fn has_block(&self, commitment: &L1Commitment) -> bool;

    fn block(&self, commitment: &L1Commitment) -> Result<Block, StateManagerError>;

    fn state(&self, commitment: &L1Commitment) -> Result<State, StateManagerError>;

    /// Durably stores `block` together with the state it produces.
    fn commit(&self, block: &Block, state: &State) -> Result<(), StateManagerError>;

    /// Records the latest confirmed state.
    fn set_latest(&self, commitment: &L1Commitment) -> Result<(), StateManagerError>;

    fn latest(&self) -> Option<L1Commitment>;

    /// Deletes the block of `commitment` and its state.
    fn prune(&self, commitment: &L1Commitment) -> Result<(), StateManagerError>;

    /// Highest index pruned so far. Blocks at or below it cannot be rebuilt
    /// from this store.
    fn largest_pruned_block_index(&self) -> Option<StateIndex>;
}

/// Send/receive primitives of the peering layer.
pub trait PeeringNetwork: Send + Sync {
    /// Registers `node` in the namespace and returns the queue its incoming
    /// envelopes are delivered to.
    fn attach(&self, peering_id: &PeeringId, node: &NodeId) -> mpsc::UnboundedReceiver<PeerEnvelope>;

    /// Best-effort delivery; unreachable recipients are silently skipped.
    fn send(&self, to: &NodeId, envelope: PeerEnvelope);
}
