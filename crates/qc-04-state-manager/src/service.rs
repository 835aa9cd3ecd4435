//! # State Manager Service
//!
//! Runs `StateManagerGpa` as a single tokio task. The task owns the protocol
//! core and multiplexes four sources:
//!
//! - local inputs queued through the `StateManagerApi` handle
//! - peer envelopes from the peering network
//! - peer-set updates
//! - the timer tick
//!
//! Messages the core emits are encoded into envelopes and handed to the
//! network. Nothing else touches the core, so it needs no locking.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shared_types::{AliasOutputWithId, Block, ChainId, NodeId, PeerEnvelope, PeeringId, State, StateDraft};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::StateManagerConfig;
use crate::domain::{StateDiff, StateManagerError, StateManagerMetrics};
use crate::events::{Input, NodeSetUpdate, OutMessages, PeerMessage, PEERING_SUBSYSTEM};
use crate::gpa::StateManagerGpa;
use crate::ports::{BlockStore, PeeringNetwork, StateManagerApi, TimeProvider};

/// Handle to a running state manager. Dropping it stops the actor.
pub struct StateManager {
    me: NodeId,
    inputs: mpsc::UnboundedSender<Input>,
    nodes: mpsc::UnboundedSender<NodeSetUpdate>,
    metrics: Arc<RwLock<StateManagerMetrics>>,
    shutdown: CancellationToken,
}

impl StateManager {
    /// Attaches to the chain's state manager peering namespace and spawns
    /// the actor on the current tokio runtime.
    pub fn new<S, N>(
        me: NodeId,
        chain_id: ChainId,
        config: StateManagerConfig,
        store: Arc<S>,
        network: Arc<N>,
    ) -> Result<Self, StateManagerError>
    where
        S: BlockStore + 'static,
        N: PeeringNetwork + 'static,
    {
        let gpa = StateManagerGpa::new(me.clone(), config.clone(), store)?;
        let peering_id = PeeringId::for_chain(&chain_id, PEERING_SUBSYSTEM);
        let messages = network.attach(&peering_id, &me);

        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (nodes_tx, nodes_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(RwLock::new(StateManagerMetrics::default()));
        let shutdown = CancellationToken::new();

        let actor = Actor {
            me: me.clone(),
            gpa,
            peering_id,
            network,
            time_provider: Arc::clone(&config.timers.time_provider),
            metrics: Arc::clone(&metrics),
        };
        tokio::spawn(actor.run(
            inputs_rx,
            nodes_rx,
            messages,
            config.timers.timer_tick_period,
            shutdown.clone(),
        ));
        info!("[qc-04] State manager {} started on chain {}", me, chain_id);

        Ok(Self {
            me,
            inputs: inputs_tx,
            nodes: nodes_tx,
            metrics,
            shutdown,
        })
    }

    pub fn me(&self) -> &NodeId {
        &self.me
    }

    /// Counters as of the last event the actor processed.
    pub fn metrics(&self) -> StateManagerMetrics {
        *self.metrics.read()
    }

    /// Stops the actor. Pending requests are abandoned and their receivers
    /// close.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.inputs.is_closed()
    }

    fn submit(&self, input: Input) {
        if self.inputs.send(input).is_err() {
            warn!("[qc-04] State manager {} is stopped, input dropped", self.me);
        }
    }
}

impl Drop for StateManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl StateManagerApi for StateManager {
    fn consensus_state_proposal(
        &self,
        ctx: CancellationToken,
        alias_output: AliasOutputWithId,
    ) -> oneshot::Receiver<()> {
        let (responder, rx) = oneshot::channel();
        self.submit(Input::ConsensusStateProposal {
            ctx,
            alias_output,
            responder,
        });
        rx
    }

    fn consensus_decided_state(
        &self,
        ctx: CancellationToken,
        alias_output: AliasOutputWithId,
    ) -> oneshot::Receiver<State> {
        let (responder, rx) = oneshot::channel();
        self.submit(Input::ConsensusDecidedState {
            ctx,
            alias_output,
            responder,
        });
        rx
    }

    fn consensus_produced_block(
        &self,
        ctx: CancellationToken,
        draft: StateDraft,
    ) -> oneshot::Receiver<Result<Block, StateManagerError>> {
        let (responder, rx) = oneshot::channel();
        self.submit(Input::ChainBlockProduced {
            ctx,
            draft,
            responder,
        });
        rx
    }

    fn chain_fetch_state_diff(
        &self,
        ctx: CancellationToken,
        prev_alias_output: AliasOutputWithId,
        next_alias_output: AliasOutputWithId,
    ) -> oneshot::Receiver<StateDiff> {
        let (responder, rx) = oneshot::channel();
        self.submit(Input::ChainFetchStateDiff {
            ctx,
            prev_alias_output,
            next_alias_output,
            responder,
        });
        rx
    }

    fn chain_nodes_updated(
        &self,
        server_nodes: Vec<NodeId>,
        access_nodes: Vec<NodeId>,
        committee_nodes: Vec<NodeId>,
    ) {
        let update = NodeSetUpdate {
            server_nodes,
            access_nodes,
            committee_nodes,
        };
        if self.nodes.send(update).is_err() {
            warn!("[qc-04] State manager {} is stopped, peer update dropped", self.me);
        }
    }

    fn chain_receive_confirmed_alias_output(&self, alias_output: AliasOutputWithId) {
        self.submit(Input::ChainReceiveConfirmedAliasOutput { alias_output });
    }
}

struct Actor<S: BlockStore, N: PeeringNetwork> {
    me: NodeId,
    gpa: StateManagerGpa<S>,
    peering_id: PeeringId,
    network: Arc<N>,
    time_provider: Arc<dyn TimeProvider>,
    metrics: Arc<RwLock<StateManagerMetrics>>,
}

impl<S: BlockStore, N: PeeringNetwork> Actor<S, N> {
    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<Input>,
        mut nodes: mpsc::UnboundedReceiver<NodeSetUpdate>,
        mut messages: mpsc::UnboundedReceiver<PeerEnvelope>,
        tick_period: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let out = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(input) = inputs.recv() => self.gpa.input(input),
                Some(envelope) = messages.recv() => self.handle_envelope(&envelope),
                Some(update) = nodes.recv() => {
                    self.gpa.chain_nodes_updated(update);
                    Vec::new()
                }
                _ = ticker.tick() => {
                    let now = self.time_provider.now();
                    self.gpa.input(Input::StateManagerTimerTick { now })
                }
            };
            self.send(out);
            *self.metrics.write() = self.gpa.metrics();
        }
        info!("[qc-04] State manager {} stopped", self.me);
    }

    fn handle_envelope(&mut self, envelope: &PeerEnvelope) -> OutMessages {
        match PeerMessage::from_envelope(envelope) {
            Ok((from, message)) => self.gpa.message(from, message),
            Err(e) => {
                warn!(
                    sender = %envelope.sender,
                    msg_type = envelope.msg_type,
                    "[qc-04] Dropping peer message: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    fn send(&self, out: OutMessages) {
        for msg in out {
            match msg.message.into_envelope(self.peering_id, self.me.clone()) {
                Ok(envelope) => self.network.send(&msg.recipient, envelope),
                Err(e) => error!("[qc-04] Failed to encode message for {}: {}", msg.recipient, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryBlockStore, InMemoryPeeringNetwork, TokioTimeProvider};
    use crate::test_utils::{node_id, BlockFactory};
    use shared_types::L1Commitment;

    const WAIT: Duration = Duration::from_secs(30);

    fn config() -> StateManagerConfig {
        StateManagerConfig::for_testing().with_time_provider(Arc::new(TokioTimeProvider::new()))
    }

    fn spawn(network: &Arc<InMemoryPeeringNetwork>, val: u8) -> (StateManager, Arc<InMemoryBlockStore>) {
        let store = Arc::new(InMemoryBlockStore::new());
        let manager = StateManager::new(
            node_id(val),
            ChainId([3u8; 32]),
            config(),
            Arc::clone(&store),
            Arc::clone(network),
        )
        .unwrap();
        (manager, store)
    }

    async fn produce(manager: &StateManager, blocks: &[Block]) {
        for block in blocks {
            let draft = StateDraft::with_mutations(
                *block.previous_l1_commitment().unwrap(),
                block.state_index() - 1,
                block.mutations().clone(),
            );
            let produced = manager
                .consensus_produced_block(CancellationToken::new(), draft)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(produced, *block);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_decided_state_fetched_from_peer() {
        let network = Arc::new(InMemoryPeeringNetwork::new());
        let (producer, _) = spawn(&network, 1);
        let (follower, follower_store) = spawn(&network, 2);
        let peers = vec![node_id(1), node_id(2)];
        producer.chain_nodes_updated(Vec::new(), Vec::new(), peers.clone());
        follower.chain_nodes_updated(Vec::new(), Vec::new(), peers);

        let mut factory = BlockFactory::with_seed(3);
        let blocks = factory.blocks(6, &L1Commitment::origin());
        produce(&producer, &blocks).await;

        let tip = &blocks[5];
        let rx = follower.consensus_decided_state(CancellationToken::new(), factory.alias_output(tip));
        let state = tokio::time::timeout(WAIT, rx).await.unwrap().unwrap();

        assert_eq!(state, factory.state(&tip.l1_commitment()));
        assert!(follower_store.has_block(&tip.l1_commitment()));
        assert!(follower.metrics().blocks_received >= 6);
        assert!(producer.metrics().get_block_served >= 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_pending_requests() {
        let network = Arc::new(InMemoryPeeringNetwork::new());
        let (manager, _) = spawn(&network, 1);
        manager.chain_nodes_updated(Vec::new(), Vec::new(), vec![node_id(1), node_id(2)]);

        let mut factory = BlockFactory::with_seed(4);
        let block = factory.blocks(1, &L1Commitment::origin()).remove(0);
        let rx = manager.consensus_state_proposal(CancellationToken::new(), factory.alias_output(&block));

        tokio::time::sleep(Duration::from_millis(200)).await;
        manager.shutdown();
        assert!(tokio::time::timeout(WAIT, rx).await.unwrap().is_err());
        assert!(!manager.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_envelopes_are_dropped() {
        let network = Arc::new(InMemoryPeeringNetwork::new());
        let (manager, _) = spawn(&network, 1);
        let peering_id = PeeringId::for_chain(&ChainId([3u8; 32]), PEERING_SUBSYSTEM);
        let intruder = node_id(9);
        let mut replies = network.attach(&peering_id, &intruder);

        network.send(&node_id(1), PeerEnvelope::new(peering_id, intruder.clone(), 7, vec![1, 2, 3]));
        network.send(&node_id(1), PeerEnvelope::new(peering_id, intruder.clone(), 1, vec![0xff]));
        let get_origin = PeerMessage::GetBlock {
            commitment: L1Commitment::origin(),
        }
        .into_envelope(peering_id, intruder)
        .unwrap();
        network.send(&node_id(1), get_origin);

        let reply = tokio::time::timeout(WAIT, replies.recv()).await.unwrap().unwrap();
        let (sender, message) = PeerMessage::from_envelope(&reply).unwrap();
        assert_eq!(sender, node_id(1));
        assert_eq!(message, PeerMessage::Block { block: Block::origin() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_produced_block_with_unknown_base_is_rejected() {
        let network = Arc::new(InMemoryPeeringNetwork::new());
        let (manager, store) = spawn(&network, 1);
        let mut factory = BlockFactory::with_seed(5);
        let blocks = factory.blocks(2, &L1Commitment::origin());
        let orphan = factory.draft_for(&blocks[1]);

        let result = manager
            .consensus_produced_block(CancellationToken::new(), orphan)
            .await
            .unwrap();
        assert!(matches!(result, Err(StateManagerError::StateNotFound { .. })));
        assert_eq!(store.block_count(), 1);
    }
}
