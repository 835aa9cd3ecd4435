//! # State Manager Protocol Core
//!
//! Deterministic protocol actor: consumes local `Input`s and peer
//! `PeerMessage`s, mutates the block cache, fetcher registries and pending
//! requests, and returns the messages to send to peers. It does no I/O
//! besides the injected `BlockStore` and never blocks.
//!
//! ## Tracing
//!
//! ```text
//!   request ──→ next block cached? ──yes──→ block_available, step back
//!                    │                              │
//!                    no                  committed or origin reached
//!                    ↓                              ↓
//!   fetcher ←── GetBlock to K peers           mark_completed
//!      │
//!   BlockMessage ──→ trace the fetcher back to a committed block,
//!                    stacking related fetchers over further gaps,
//!                    then resume every request that waited
//! ```
//!
//! Missing blocks are re-requested on timer ticks every
//! `get_block_retry_period` until they arrive or nobody waits for them.
//! A missing block at or below the store's largest pruned index is never
//! requested: the requests waiting on it are abandoned.
//!
//! ## Pruning
//!
//! After every commit the oldest states of the committed chain beyond
//! `pruning_min_states_to_keep` are deleted, at most
//! `pruning_max_states_to_delete` per commit.

mod handlers;
mod maintenance;
mod pruning;
mod trace;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use shared_types::{Block, L1Commitment, NodeId, State};
use tracing::{debug, info};

use crate::config::StateManagerConfig;
use crate::domain::{
    BlockCache, BlockFetchers, BlockRequest, CommittedChain, MempoolDiffRequest, NodeRandomiser,
    RequestId, StateManagerError, StateManagerMetrics,
};
use crate::events::{Input, NodeSetUpdate, OutMessages, PeerMessage};
use crate::ports::BlockStore;

pub struct StateManagerGpa<S: BlockStore> {
    me: NodeId,
    config: StateManagerConfig,
    store: Arc<S>,
    block_cache: BlockCache,
    /// Missing blocks being requested from peers.
    blocks_to_fetch: BlockFetchers,
    /// Cached blocks waiting for a missing ancestor.
    blocks_fetched: BlockFetchers,
    requests: HashMap<RequestId, BlockRequest>,
    diffs: HashMap<RequestId, MempoolDiffRequest>,
    /// Committed chain tracked for pruning.
    committed_chain: CommittedChain,
    next_request_id: RequestId,
    node_randomiser: NodeRandomiser,
    access_nodes: Vec<NodeId>,
    last_get_blocks_time: SystemTime,
    last_clean_block_cache_time: SystemTime,
    last_clean_requests_time: SystemTime,
    last_status_log_time: SystemTime,
    metrics: StateManagerMetrics,
}

impl<S: BlockStore> StateManagerGpa<S> {
    /// Creates the protocol core, committing the origin block if the store
    /// does not hold it yet.
    pub fn new(me: NodeId, config: StateManagerConfig, store: Arc<S>) -> Result<Self, StateManagerError> {
        let randomiser = NodeRandomiser::new(me.clone());
        Self::with_randomiser(me, config, store, randomiser)
    }

    pub fn with_randomiser(
        me: NodeId,
        config: StateManagerConfig,
        store: Arc<S>,
        node_randomiser: NodeRandomiser,
    ) -> Result<Self, StateManagerError> {
        if !store.has_block(&L1Commitment::origin()) {
            store.commit(&Block::origin(), &State::origin())?;
            info!("[qc-04] Node {}: origin block committed", me);
        }
        let block_cache = BlockCache::new(Arc::clone(&config.timers.time_provider));
        Ok(Self {
            me,
            config,
            store,
            block_cache,
            blocks_to_fetch: BlockFetchers::new(),
            blocks_fetched: BlockFetchers::new(),
            requests: HashMap::new(),
            diffs: HashMap::new(),
            committed_chain: CommittedChain::new(),
            next_request_id: 0,
            node_randomiser,
            access_nodes: Vec::new(),
            last_get_blocks_time: UNIX_EPOCH,
            last_clean_block_cache_time: UNIX_EPOCH,
            last_clean_requests_time: UNIX_EPOCH,
            last_status_log_time: UNIX_EPOCH,
            metrics: StateManagerMetrics::default(),
        })
    }

    pub fn input(&mut self, input: Input) -> OutMessages {
        match input {
            Input::ChainBlockProduced {
                ctx,
                draft,
                responder,
            } => self.handle_chain_block_produced(ctx, draft, responder),
            Input::ConsensusStateProposal {
                ctx,
                alias_output,
                responder,
            } => self.handle_consensus_state_proposal(ctx, alias_output, responder),
            Input::ConsensusDecidedState {
                ctx,
                alias_output,
                responder,
            } => self.handle_consensus_decided_state(ctx, alias_output, responder),
            Input::ChainFetchStateDiff {
                ctx,
                prev_alias_output,
                next_alias_output,
                responder,
            } => self.handle_chain_fetch_state_diff(ctx, prev_alias_output, next_alias_output, responder),
            Input::ChainReceiveConfirmedAliasOutput { alias_output } => {
                self.handle_chain_receive_confirmed_alias_output(alias_output)
            }
            Input::StateManagerTimerTick { now } => self.handle_timer_tick(now),
        }
    }

    pub fn message(&mut self, from: NodeId, message: PeerMessage) -> OutMessages {
        match message {
            PeerMessage::GetBlock { commitment } => self.handle_peer_get_block(from, commitment),
            PeerMessage::Block { block } => self.handle_peer_block(from, block),
        }
    }

    /// Replaces the peer set blocks are requested from.
    pub fn chain_nodes_updated(&mut self, update: NodeSetUpdate) {
        debug!(
            "[qc-04] Node {}: peers updated, {} server, {} access, {} committee",
            self.me,
            update.server_nodes.len(),
            update.access_nodes.len(),
            update.committee_nodes.len()
        );
        self.node_randomiser.update_node_ids(update.queryable_nodes());
        self.access_nodes = update.access_nodes;
    }

    pub fn me(&self) -> &NodeId {
        &self.me
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn access_nodes(&self) -> &[NodeId] {
        &self.access_nodes
    }

    pub fn metrics(&self) -> StateManagerMetrics {
        self.metrics
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn blocks_to_fetch(&self) -> usize {
        self.blocks_to_fetch.len()
    }

    pub fn cached_blocks(&self) -> usize {
        self.block_cache.len()
    }

    pub fn is_cached(&self, block: &Block) -> bool {
        self.block_cache.contains(&block.hash())
    }

    pub fn status_string(&self) -> String {
        format!(
            "State manager {}: {} requests, {} diffs, {} blocks to fetch ({} waiting), {} blocks fetched, {} blocks cached",
            self.me,
            self.requests.len(),
            self.diffs.len(),
            self.blocks_to_fetch.len(),
            self.blocks_to_fetch.callback_count(),
            self.blocks_fetched.len(),
            self.block_cache.len()
        )
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request_id += 1;
        self.next_request_id
    }
}
