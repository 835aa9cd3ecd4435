//! # Block Requests
//!
//! A `BlockRequest` is a caller's demand to have the chain ending at some
//! commitment available locally, and for most kinds, the state at that
//! commitment materialized.
//!
//! While the state manager traces the chain backward, every visited block is
//! handed to `block_available`; the request records them in decreasing index
//! order. Once the trace reaches a committed block or the origin,
//! `mark_completed` is called exactly once with a function producing the base
//! state the recorded blocks are replayed onto. A materialized state is only
//! handed to its caller through `deliver_state`, once the replayed blocks are
//! committed.
//!
//! | Kind | Response | Materializes state |
//! |------|----------|--------------------|
//! | `StateProposal` | `()` signal | no |
//! | `DecidedState` | the `State` | yes |
//! | `MempoolDiff` | half of a `MempoolDiffRequest` | yes |
//! | `Local` | none | yes |

use shared_types::{Block, L1Commitment, State, StateIndex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::StateManagerError;
use crate::domain::value_objects::StateDiff;

pub type RequestId = u64;

/// Which tip of a state diff a `MempoolDiff` request traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffSide {
    Old,
    New,
}

#[derive(Debug)]
pub enum RequestKind {
    StateProposal { responder: Option<oneshot::Sender<()>> },
    DecidedState { responder: Option<oneshot::Sender<State>> },
    MempoolDiff { diff: RequestId, side: DiffSide },
    Local,
}

/// Outcome of `BlockRequest::mark_completed`.
#[derive(Debug)]
pub enum Completion {
    /// The caller was signalled; nothing was materialized.
    Signalled,
    /// The state was materialized but not yet delivered. `reconstructed`
    /// holds every replayed block with the state it produced, in increasing
    /// index order.
    Materialized {
        state: State,
        reconstructed: Vec<(Block, State)>,
    },
}

#[derive(Debug)]
pub struct BlockRequest {
    id: RequestId,
    commitment: L1Commitment,
    state_index: StateIndex,
    ctx: CancellationToken,
    /// Visited blocks, strictly decreasing index.
    blocks: Vec<Block>,
    done: bool,
    kind: RequestKind,
}

impl BlockRequest {
    fn new(
        id: RequestId,
        commitment: L1Commitment,
        state_index: StateIndex,
        ctx: CancellationToken,
        kind: RequestKind,
    ) -> Self {
        Self {
            id,
            commitment,
            state_index,
            ctx,
            blocks: Vec::new(),
            done: false,
            kind,
        }
    }

    pub fn state_proposal(
        id: RequestId,
        commitment: L1Commitment,
        state_index: StateIndex,
        ctx: CancellationToken,
        responder: oneshot::Sender<()>,
    ) -> Self {
        let kind = RequestKind::StateProposal {
            responder: Some(responder),
        };
        Self::new(id, commitment, state_index, ctx, kind)
    }

    pub fn decided_state(
        id: RequestId,
        commitment: L1Commitment,
        state_index: StateIndex,
        ctx: CancellationToken,
        responder: oneshot::Sender<State>,
    ) -> Self {
        let kind = RequestKind::DecidedState {
            responder: Some(responder),
        };
        Self::new(id, commitment, state_index, ctx, kind)
    }

    pub fn mempool_diff(
        id: RequestId,
        commitment: L1Commitment,
        state_index: StateIndex,
        ctx: CancellationToken,
        diff: RequestId,
        side: DiffSide,
    ) -> Self {
        Self::new(id, commitment, state_index, ctx, RequestKind::MempoolDiff { diff, side })
    }

    /// Internal request; never cancelled by a caller.
    pub fn local(id: RequestId, commitment: L1Commitment, state_index: StateIndex) -> Self {
        Self::new(id, commitment, state_index, CancellationToken::new(), RequestKind::Local)
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    pub fn get_last_l1_commitment(&self) -> &L1Commitment {
        &self.commitment
    }

    pub fn get_last_state_index(&self) -> StateIndex {
        self.state_index
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// False once completed, cancelled, or when the caller stopped listening.
    pub fn is_valid(&self) -> bool {
        if self.done || self.ctx.is_cancelled() {
            return false;
        }
        match &self.kind {
            RequestKind::StateProposal { responder } => {
                responder.as_ref().is_some_and(|r| !r.is_closed())
            }
            RequestKind::DecidedState { responder } => {
                responder.as_ref().is_some_and(|r| !r.is_closed())
            }
            RequestKind::MempoolDiff { .. } | RequestKind::Local => true,
        }
    }

    /// Commitment of the next block the trace has to visit, or `None` once the
    /// origin block has been recorded.
    pub fn next_commitment(&self) -> Option<L1Commitment> {
        match self.blocks.last() {
            None => Some(self.commitment),
            Some(block) => block.previous_l1_commitment().copied(),
        }
    }

    /// Index of the block `next_commitment` refers to.
    pub fn next_state_index(&self) -> StateIndex {
        match self.blocks.last() {
            None => self.state_index,
            Some(block) => block.state_index().saturating_sub(1),
        }
    }

    /// Records the next block of the trace.
    ///
    /// Returns `false` and records nothing when the block is not the one
    /// `next_commitment` points at, its index is not exactly one below the
    /// previously recorded block (or the requested index for the first
    /// block), or the request is already done.
    pub fn block_available(&mut self, block: Block) -> bool {
        if self.done {
            return false;
        }
        if self.next_commitment() != Some(block.l1_commitment()) {
            return false;
        }
        let expected_index = match self.blocks.last() {
            None => Some(self.state_index),
            Some(last) => last.state_index().checked_sub(1),
        };
        if expected_index != Some(block.state_index()) {
            return false;
        }
        self.blocks.push(block);
        true
    }

    /// Completes the request. Any call after the first fails with
    /// `AlreadyCompleted`.
    ///
    /// `obtain_state` yields the state the recorded blocks are replayed onto.
    /// Each block is checked against the state it extends before it is
    /// applied; on a mismatch the whole request fails and nothing is reported
    /// as reconstructed.
    pub fn mark_completed(
        &mut self,
        obtain_state: impl FnOnce() -> Result<State, StateManagerError>,
    ) -> Result<Completion, StateManagerError> {
        if self.done {
            return Err(StateManagerError::AlreadyCompleted);
        }
        self.done = true;

        if let RequestKind::StateProposal { responder } = &mut self.kind {
            if let Some(responder) = responder.take() {
                let _ = responder.send(());
            }
            return Ok(Completion::Signalled);
        }

        let mut state = obtain_state()?;
        let mut reconstructed = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.iter().rev() {
            state = state.apply_block(block)?;
            reconstructed.push((block.clone(), state.clone()));
        }
        Ok(Completion::Materialized {
            state,
            reconstructed,
        })
    }

    /// Hands a materialized `state` to a `DecidedState` caller. No effect for
    /// other kinds or after the first call.
    pub fn deliver_state(&mut self, state: State) {
        if let RequestKind::DecidedState { responder } = &mut self.kind {
            if let Some(responder) = responder.take() {
                let _ = responder.send(state);
            }
        }
    }
}

/// A state diff request: two block requests, one per tip, reconciled once
/// both have completed.
#[derive(Debug)]
pub struct MempoolDiffRequest {
    ctx: CancellationToken,
    old_commitment: L1Commitment,
    new_commitment: L1Commitment,
    old_done: bool,
    new_done: bool,
    responder: Option<oneshot::Sender<StateDiff>>,
}

impl MempoolDiffRequest {
    pub fn new(
        ctx: CancellationToken,
        old_commitment: L1Commitment,
        new_commitment: L1Commitment,
        responder: oneshot::Sender<StateDiff>,
    ) -> Self {
        Self {
            ctx,
            old_commitment,
            new_commitment,
            old_done: false,
            new_done: false,
            responder: Some(responder),
        }
    }

    pub fn ctx(&self) -> &CancellationToken {
        &self.ctx
    }

    pub fn old_commitment(&self) -> &L1Commitment {
        &self.old_commitment
    }

    pub fn new_commitment(&self) -> &L1Commitment {
        &self.new_commitment
    }

    pub fn is_valid(&self) -> bool {
        !self.ctx.is_cancelled() && self.responder.as_ref().is_some_and(|r| !r.is_closed())
    }

    /// Marks one side as traced. Returns `true` once both sides are.
    pub fn side_completed(&mut self, side: DiffSide) -> bool {
        match side {
            DiffSide::Old => self.old_done = true,
            DiffSide::New => self.new_done = true,
        }
        self.old_done && self.new_done
    }

    /// Delivers the diff. Only the first call has an effect.
    pub fn respond(&mut self, diff: StateDiff) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(diff);
        }
    }
}
