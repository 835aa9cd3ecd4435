//! Handlers of local inputs and peer messages.

use shared_types::{AliasOutputWithId, Block, L1Commitment, NodeId, State, StateDraft};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::StateManagerGpa;
use crate::domain::{BlockRequest, DiffSide, MempoolDiffRequest, StateDiff, StateManagerError};
use crate::events::{OutMessage, OutMessages, PeerMessage};
use crate::ports::BlockStore;

impl<S: BlockStore> StateManagerGpa<S> {
    pub(super) fn handle_chain_block_produced(
        &mut self,
        ctx: CancellationToken,
        draft: StateDraft,
        responder: oneshot::Sender<Result<Block, StateManagerError>>,
    ) -> OutMessages {
        if ctx.is_cancelled() {
            debug!("[qc-04] Produced block on {} dropped: cancelled", draft.base_commitment().block_hash);
            return Vec::new();
        }
        let block = match self.commit_draft(draft) {
            Ok(block) => block,
            Err(e) => {
                warn!("[qc-04] Failed to commit produced block: {}", e);
                let _ = responder.send(Err(e));
                return Vec::new();
            }
        };
        debug!(
            "[qc-04] Node {}: produced block {} index {} committed",
            self.me,
            block.hash(),
            block.state_index()
        );
        self.blocks_committed(&block);
        let hash = block.hash();
        self.block_cache.add_block(block.clone());
        let _ = responder.send(Ok(block));

        match self.blocks_to_fetch.take_fetcher(&hash) {
            Some(fetcher) => self.trace_block_chain(fetcher),
            None => Vec::new(),
        }
    }

    fn commit_draft(&self, draft: StateDraft) -> Result<Block, StateManagerError> {
        let base = self.store.state(draft.base_commitment())?;
        let (block, state) = base.commit_draft(draft)?;
        self.store.commit(&block, &state)?;
        Ok(block)
    }

    pub(super) fn handle_consensus_state_proposal(
        &mut self,
        ctx: CancellationToken,
        alias_output: AliasOutputWithId,
        responder: oneshot::Sender<()>,
    ) -> OutMessages {
        let Some(commitment) = parse_commitment(&alias_output, "state proposal") else {
            return Vec::new();
        };
        let id = self.next_request_id();
        debug!(
            "[qc-04] Request {}: state proposal {} index {}",
            id, commitment.block_hash, alias_output.state_index
        );
        let request = BlockRequest::state_proposal(id, commitment, alias_output.state_index, ctx, responder);
        self.start_request(request)
    }

    pub(super) fn handle_consensus_decided_state(
        &mut self,
        ctx: CancellationToken,
        alias_output: AliasOutputWithId,
        responder: oneshot::Sender<State>,
    ) -> OutMessages {
        let Some(commitment) = parse_commitment(&alias_output, "decided state") else {
            return Vec::new();
        };
        let id = self.next_request_id();
        debug!(
            "[qc-04] Request {}: decided state {} index {}",
            id, commitment.block_hash, alias_output.state_index
        );
        let request = BlockRequest::decided_state(id, commitment, alias_output.state_index, ctx, responder);
        self.start_request(request)
    }

    pub(super) fn handle_chain_fetch_state_diff(
        &mut self,
        ctx: CancellationToken,
        prev_alias_output: AliasOutputWithId,
        next_alias_output: AliasOutputWithId,
        responder: oneshot::Sender<StateDiff>,
    ) -> OutMessages {
        let Some(old) = parse_commitment(&prev_alias_output, "state diff") else {
            return Vec::new();
        };
        let Some(new) = parse_commitment(&next_alias_output, "state diff") else {
            return Vec::new();
        };
        let diff_id = self.next_request_id();
        debug!(
            "[qc-04] State diff {}: {} index {} to {} index {}",
            diff_id,
            old.block_hash,
            prev_alias_output.state_index,
            new.block_hash,
            next_alias_output.state_index
        );
        self.diffs
            .insert(diff_id, MempoolDiffRequest::new(ctx.clone(), old, new, responder));

        let old_id = self.next_request_id();
        let old_request = BlockRequest::mempool_diff(
            old_id,
            old,
            prev_alias_output.state_index,
            ctx.clone(),
            diff_id,
            DiffSide::Old,
        );
        let new_id = self.next_request_id();
        let new_request = BlockRequest::mempool_diff(
            new_id,
            new,
            next_alias_output.state_index,
            ctx,
            diff_id,
            DiffSide::New,
        );
        let mut out = self.start_request(old_request);
        out.extend(self.start_request(new_request));
        out
    }

    pub(super) fn handle_chain_receive_confirmed_alias_output(
        &mut self,
        alias_output: AliasOutputWithId,
    ) -> OutMessages {
        let Some(commitment) = parse_commitment(&alias_output, "confirmed output") else {
            return Vec::new();
        };
        let id = self.next_request_id();
        debug!(
            "[qc-04] Request {}: confirmed state {} index {}",
            id, commitment.block_hash, alias_output.state_index
        );
        self.start_request(BlockRequest::local(id, commitment, alias_output.state_index))
    }

    pub(super) fn handle_peer_get_block(&mut self, from: NodeId, commitment: L1Commitment) -> OutMessages {
        let Some(block) = self.get_block(&commitment) else {
            debug!(
                "[qc-04] Node {} asked for unknown block {}",
                from, commitment.block_hash
            );
            return Vec::new();
        };
        self.metrics.get_block_served += 1;
        vec![OutMessage::new(from, PeerMessage::Block { block })]
    }

    pub(super) fn handle_peer_block(&mut self, from: NodeId, block: Block) -> OutMessages {
        let hash = block.hash();
        let Some(fetcher) = self.blocks_to_fetch.take_fetcher(&hash) else {
            self.metrics.blocks_ignored += 1;
            debug!("[qc-04] Block {} from {} ignored: not awaited", hash, from);
            return Vec::new();
        };
        if *fetcher.commitment() != block.l1_commitment() {
            warn!(
                block_hash = %hash,
                sender = %from,
                "[qc-04] Block ignored: trie root does not match the awaited commitment"
            );
            self.blocks_to_fetch.add_fetcher(fetcher);
            self.metrics.blocks_ignored += 1;
            return Vec::new();
        }
        self.metrics.blocks_received += 1;
        debug!(
            "[qc-04] Block {} index {} received from {}",
            hash,
            block.state_index(),
            from
        );
        self.block_cache.add_block(block);
        self.trace_block_chain(fetcher)
    }
}

fn parse_commitment(alias_output: &AliasOutputWithId, purpose: &str) -> Option<L1Commitment> {
    match alias_output.l1_commitment() {
        Ok(commitment) => Some(commitment),
        Err(e) => {
            warn!("[qc-04] Ignoring {} for index {}: {}", purpose, alias_output.state_index, e);
            None
        }
    }
}
