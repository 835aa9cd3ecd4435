//! Local inputs of the state manager.

use std::time::SystemTime;

use shared_types::{AliasOutputWithId, Block, NodeId, State, StateDraft};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::domain::{StateDiff, StateManagerError};

#[derive(Debug)]
pub enum Input {
    /// A block produced by this node's consensus instance.
    ChainBlockProduced {
        ctx: CancellationToken,
        draft: StateDraft,
        responder: oneshot::Sender<Result<Block, StateManagerError>>,
    },
    /// Make the chain of the proposed state available.
    ConsensusStateProposal {
        ctx: CancellationToken,
        alias_output: AliasOutputWithId,
        responder: oneshot::Sender<()>,
    },
    /// Make the chain of the decided state available and return the state.
    ConsensusDecidedState {
        ctx: CancellationToken,
        alias_output: AliasOutputWithId,
        responder: oneshot::Sender<State>,
    },
    /// Blocks added and removed between two states, for the mempool.
    ChainFetchStateDiff {
        ctx: CancellationToken,
        prev_alias_output: AliasOutputWithId,
        next_alias_output: AliasOutputWithId,
        responder: oneshot::Sender<StateDiff>,
    },
    /// The chain's state was confirmed on the ledger.
    ChainReceiveConfirmedAliasOutput { alias_output: AliasOutputWithId },
    StateManagerTimerTick { now: SystemTime },
}

/// New peer set of the chain, as queued for the state manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSetUpdate {
    pub server_nodes: Vec<NodeId>,
    pub access_nodes: Vec<NodeId>,
    pub committee_nodes: Vec<NodeId>,
}

impl NodeSetUpdate {
    /// Peers that may be asked for blocks: committee and server nodes.
    pub fn queryable_nodes(&self) -> Vec<NodeId> {
        self.committee_nodes
            .iter()
            .chain(&self.server_nodes)
            .cloned()
            .collect()
    }
}
