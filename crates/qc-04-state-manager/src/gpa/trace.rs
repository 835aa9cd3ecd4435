//! Backward tracing of requests and fetchers.

use std::sync::Arc;

use shared_types::{Block, L1Commitment, State, StateIndex};
use tracing::{debug, error, info, warn};

use super::StateManagerGpa;
use crate::domain::chain_of_blocks::common_ancestor_index;
use crate::domain::{
    BlockFetcher, BlockRequest, ChainOfBlocks, Completion, DiffSide, RequestId, RequestKind,
    StateDiff, StateManagerError,
};
use crate::events::{OutMessage, OutMessages, PeerMessage};
use crate::ports::BlockStore;

/// Where a finished trace stopped.
#[derive(Debug, Clone, Copy)]
enum TraceBase {
    /// The origin block was recorded; replay starts from the empty state.
    Origin,
    /// The next block is committed; replay starts from its state.
    Committed(L1Commitment),
}

impl<S: BlockStore> StateManagerGpa<S> {
    pub(super) fn start_request(&mut self, request: BlockRequest) -> OutMessages {
        let id = request.id();
        self.requests.insert(id, request);
        self.continue_request(id)
    }

    /// Walks request `id` backward over every block available locally. Stops
    /// by completing the request or by parking it on the fetcher of the first
    /// missing block.
    pub(super) fn continue_request(&mut self, id: RequestId) -> OutMessages {
        loop {
            let (next, next_index) = match self.requests.get(&id) {
                None => return Vec::new(),
                Some(request) if !request.is_valid() => {
                    self.requests.remove(&id);
                    debug!("[qc-04] Request {} dropped: no longer awaited", id);
                    return Vec::new();
                }
                Some(request) => (request.next_commitment(), request.next_state_index()),
            };
            let Some(next) = next else {
                self.complete_request(id, TraceBase::Origin);
                return Vec::new();
            };
            if self.store.has_block(&next) {
                self.complete_request(id, TraceBase::Committed(next));
                return Vec::new();
            }
            let Some(block) = self.get_block(&next) else {
                return self.wait_for_block(next, next_index, id);
            };
            let accepted = self
                .requests
                .get_mut(&id)
                .is_some_and(|request| request.block_available(block));
            if !accepted {
                warn!(
                    "[qc-04] Request {} abandoned: block {} breaks the chain order",
                    id, next.block_hash
                );
                self.requests.remove(&id);
                self.metrics.requests_abandoned += 1;
                return Vec::new();
            }
        }
    }

    fn wait_for_block(&mut self, commitment: L1Commitment, index: StateIndex, id: RequestId) -> OutMessages {
        let hash = commitment.block_hash;
        if self.blocks_to_fetch.add_callback(&hash, id) || self.blocks_fetched.add_callback(&hash, id) {
            debug!("[qc-04] Request {} joined the fetch of block {}", id, hash);
            return Vec::new();
        }
        self.trace_block_chain(BlockFetcher::with_callback(index, commitment, id))
    }

    /// Follows `fetcher`'s block backward through the cache until a committed
    /// block, the origin or a missing block is reached. Each block between is
    /// parked in `blocks_fetched` with the fetcher above it stacked as
    /// related, so one arriving block can resolve the whole stack.
    pub(super) fn trace_block_chain(&mut self, mut fetcher: BlockFetcher) -> OutMessages {
        loop {
            let commitment = *fetcher.commitment();
            if self.store.has_block(&commitment) {
                break;
            }
            let Some(block) = self.get_block(&commitment) else {
                if let Some(boundary) = self
                    .store
                    .largest_pruned_block_index()
                    .filter(|boundary| fetcher.state_index() <= *boundary)
                {
                    warn!(
                        "[qc-04] Block {} index {} missing at or below pruned index {}, abandoning its requests",
                        commitment.block_hash,
                        fetcher.state_index(),
                        boundary
                    );
                    self.abandon_fetcher(fetcher);
                    return Vec::new();
                }
                debug!(
                    "[qc-04] Block {} index {} missing, asking peers",
                    commitment.block_hash,
                    fetcher.state_index()
                );
                let out = self.get_block_messages(&commitment);
                self.blocks_to_fetch.add_fetcher(fetcher);
                return out;
            };
            let Some(previous) = block.previous_l1_commitment().copied() else {
                break;
            };
            if self.store.has_block(&previous) {
                break;
            }
            let hash = commitment.block_hash;
            self.blocks_fetched.add_fetcher(fetcher);
            if self.blocks_to_fetch.add_related_fetcher(&previous.block_hash, hash)
                || self.blocks_fetched.add_related_fetcher(&previous.block_hash, hash)
            {
                return Vec::new();
            }
            fetcher = BlockFetcher::with_related(block.state_index().saturating_sub(1), previous, hash);
        }
        self.mark_fetched(fetcher)
    }

    /// Resolves `fetcher` and everything stacked on it, then resumes every
    /// request that waited on any of them.
    fn mark_fetched(&mut self, fetcher: BlockFetcher) -> OutMessages {
        let block_cache = &self.block_cache;
        let store = &self.store;
        let outcome = self.blocks_fetched.notify_fetched(fetcher, |f| {
            block_cache.contains(f.block_hash()) || store.has_block(f.commitment())
        });

        let mut out = Vec::new();
        for stalled in outcome.stalled {
            debug!(
                "[qc-04] Block {} left the cache before its chain resolved, fetching again",
                stalled.block_hash()
            );
            out.extend(self.get_block_messages(stalled.commitment()));
            self.blocks_to_fetch.add_fetcher(stalled);
        }
        for resolved in outcome.resolved {
            for id in resolved.callbacks() {
                out.extend(self.continue_request(*id));
            }
        }
        out
    }

    /// Abandons every request waiting on `fetcher` or on a fetcher stacked
    /// on it.
    fn abandon_fetcher(&mut self, fetcher: BlockFetcher) {
        let outcome = self.blocks_fetched.notify_fetched(fetcher, |_| true);
        for resolved in outcome.resolved {
            for id in resolved.callbacks() {
                if let Some(request) = self.requests.remove(id) {
                    self.metrics.requests_abandoned += 1;
                    self.drop_diff_of(&request);
                }
            }
        }
    }

    /// Block of `commitment` from the cache or the store.
    pub(super) fn get_block(&self, commitment: &L1Commitment) -> Option<Block> {
        if let Some(block) = self.block_cache.get_block(&commitment.block_hash) {
            if block.l1_commitment() == *commitment {
                return Some(block.clone());
            }
        }
        self.store.block(commitment).ok()
    }

    /// `GetBlock` for `commitment` to a random selection of peers.
    pub(super) fn get_block_messages(&mut self, commitment: &L1Commitment) -> OutMessages {
        let recipients = self
            .node_randomiser
            .get_random_other_node_ids(self.config.get_block_node_count);
        self.metrics.get_block_sent += recipients.len() as u64;
        recipients
            .into_iter()
            .map(|recipient| {
                OutMessage::new(
                    recipient,
                    PeerMessage::GetBlock {
                        commitment: *commitment,
                    },
                )
            })
            .collect()
    }

    fn complete_request(&mut self, id: RequestId, base: TraceBase) {
        let Some(mut request) = self.requests.remove(&id) else {
            return;
        };
        let store = Arc::clone(&self.store);
        let result = request.mark_completed(|| match base {
            TraceBase::Origin => Ok(State::empty()),
            TraceBase::Committed(commitment) => store.state(&commitment),
        });

        match result {
            Ok(Completion::Signalled) => {
                self.metrics.requests_completed += 1;
                debug!(
                    "[qc-04] Request {} completed: chain of {} available",
                    id,
                    request.get_last_l1_commitment().block_hash
                );
            }
            Ok(Completion::Materialized {
                state,
                reconstructed,
            }) => {
                if let Err(e) = self.commit_reconstructed(&reconstructed) {
                    self.metrics.requests_abandoned += 1;
                    error!(request = id, "[qc-04] Failed to commit replayed blocks: {}", e);
                    self.drop_diff_of(&request);
                    return;
                }
                self.metrics.requests_completed += 1;
                debug!(
                    "[qc-04] Request {} completed: state {} materialized, {} blocks replayed",
                    id,
                    request.get_last_state_index(),
                    reconstructed.len()
                );
                if let Some((tip, _)) = reconstructed.last() {
                    self.blocks_committed(tip);
                }
                request.deliver_state(state);
                match request.kind() {
                    RequestKind::Local => self.set_latest(request.get_last_l1_commitment()),
                    RequestKind::MempoolDiff { diff, side } => self.diff_side_completed(*diff, *side),
                    _ => {}
                }
            }
            Err(e) => {
                self.metrics.requests_abandoned += 1;
                warn!(request = id, "[qc-04] Request abandoned: {}", e);
                self.drop_diff_of(&request);
            }
        }
    }

    /// Drops the state diff a mempool request works for, closing the diff's
    /// responder. The other side's completion then finds nothing to do.
    fn drop_diff_of(&mut self, request: &BlockRequest) {
        if let RequestKind::MempoolDiff { diff, .. } = request.kind() {
            if self.diffs.remove(diff).is_some() {
                debug!("[qc-04] State diff {} dropped with request {}", diff, request.id());
            }
        }
    }

    fn commit_reconstructed(&self, reconstructed: &[(Block, State)]) -> Result<(), StateManagerError> {
        for (block, state) in reconstructed {
            if self.store.has_block(&block.l1_commitment()) {
                continue;
            }
            self.store.commit(block, state)?;
        }
        Ok(())
    }

    fn set_latest(&self, commitment: &L1Commitment) {
        match self.store.set_latest(commitment) {
            Ok(()) => info!(
                "[qc-04] Node {}: latest state set to {}",
                self.me, commitment.block_hash
            ),
            Err(e) => error!("[qc-04] Failed to record latest state {}: {}", commitment.block_hash, e),
        }
    }

    fn diff_side_completed(&mut self, diff_id: RequestId, side: DiffSide) {
        let both_done = self
            .diffs
            .get_mut(&diff_id)
            .is_some_and(|diff| diff.side_completed(side));
        if !both_done {
            return;
        }
        let Some(mut diff) = self.diffs.remove(&diff_id) else {
            return;
        };
        if !diff.is_valid() {
            debug!("[qc-04] State diff {} dropped: no longer awaited", diff_id);
            return;
        }
        match self.compute_state_diff(diff.old_commitment(), diff.new_commitment()) {
            Ok(state_diff) => {
                debug!(
                    "[qc-04] State diff {}: {} blocks added, {} removed",
                    diff_id,
                    state_diff.added.len(),
                    state_diff.removed.len()
                );
                diff.respond(state_diff);
            }
            Err(e) => warn!("[qc-04] State diff {} failed: {}", diff_id, e),
        }
    }

    /// Both tips must be committed down to the origin.
    fn compute_state_diff(&self, old: &L1Commitment, new: &L1Commitment) -> Result<StateDiff, StateManagerError> {
        let store = self.store.as_ref();
        let mut old_chain = ChainOfBlocks::new(store, old)?;
        let mut new_chain = ChainOfBlocks::new(store, new)?;
        let common = common_ancestor_index(&mut old_chain, &mut new_chain)?;
        Ok(StateDiff {
            new_state: store.state(new)?,
            added: new_chain.get_blocks_from(common)?,
            removed: old_chain.get_blocks_from(common)?,
        })
    }
}
