//! # Driving Ports (Inbound API)
//!
//! The API the consensus and chain collaborators use.
//!
//! None of the calls block: each one queues the work for the state manager
//! and hands back a single-slot channel the answer will arrive on. The
//! channel closes without a value when the request is abandoned (cancelled
//! context, unrecoverable chain data, or the state manager stopped).

use shared_types::{AliasOutputWithId, Block, NodeId, State, StateDraft};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::domain::{StateDiff, StateManagerError};

pub trait StateManagerApi: Send + Sync {
    /// Resolves once the chain ending at the alias output's state is
    /// available locally.
    fn consensus_state_proposal(
        &self,
        ctx: CancellationToken,
        alias_output: AliasOutputWithId,
    ) -> oneshot::Receiver<()>;

    /// Resolves with the state of the alias output, reconstructing the
    /// missing part of its chain first.
    fn consensus_decided_state(
        &self,
        ctx: CancellationToken,
        alias_output: AliasOutputWithId,
    ) -> oneshot::Receiver<State>;

    /// Commits a block produced locally. Resolves after the block and its
    /// state are stored.
    fn consensus_produced_block(
        &self,
        ctx: CancellationToken,
        draft: StateDraft,
    ) -> oneshot::Receiver<Result<Block, StateManagerError>>;

    /// Resolves with the blocks added and removed when moving from the
    /// previous alias output's state to the next one.
    fn chain_fetch_state_diff(
        &self,
        ctx: CancellationToken,
        prev_alias_output: AliasOutputWithId,
        next_alias_output: AliasOutputWithId,
    ) -> oneshot::Receiver<StateDiff>;

    /// Replaces the set of peers. Access nodes are kept for addressing but
    /// never queried for blocks.
    fn chain_nodes_updated(
        &self,
        server_nodes: Vec<NodeId>,
        access_nodes: Vec<NodeId>,
        committee_nodes: Vec<NodeId>,
    );

    /// Makes the confirmed state available locally and records it as latest.
    fn chain_receive_confirmed_alias_output(&self, alias_output: AliasOutputWithId);
}
