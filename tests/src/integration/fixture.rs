//! Cluster of state managers sharing one in-process network.

use std::sync::{Arc, Once};
use std::time::Duration;

use qc_04_state_manager::test_utils::{node_ids, BlockFactory};
use qc_04_state_manager::{
    InMemoryBlockStore, InMemoryPeeringNetwork, StateManager, StateManagerApi, StateManagerConfig,
    TokioTimeProvider,
};
use shared_types::{Block, ChainId, NodeId, StateDraft};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Upper bound for any single scenario step, in paused runtime time.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(120);

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer().with_target(true))
            .try_init();
    });
}

pub struct Cluster {
    pub ids: Vec<NodeId>,
    pub network: Arc<InMemoryPeeringNetwork>,
    pub managers: Vec<StateManager>,
    pub stores: Vec<Arc<InMemoryBlockStore>>,
    pub factory: BlockFactory,
}

impl Cluster {
    /// Starts `count` state managers of one chain, every node a committee member.
    pub fn start(count: u8, seed: u64) -> Self {
        init_tracing();
        let ids = node_ids(count);
        let network = Arc::new(InMemoryPeeringNetwork::new());
        let config = StateManagerConfig::for_testing().with_time_provider(Arc::new(TokioTimeProvider::new()));
        let chain_id = ChainId([0x42; 32]);

        let mut managers = Vec::new();
        let mut stores = Vec::new();
        for id in &ids {
            let store = Arc::new(InMemoryBlockStore::new());
            let manager = StateManager::new(
                id.clone(),
                chain_id,
                config.clone(),
                Arc::clone(&store),
                Arc::clone(&network),
            )
            .expect("state manager starts");
            manager.chain_nodes_updated(Vec::new(), Vec::new(), ids.clone());
            managers.push(manager);
            stores.push(store);
        }
        Self {
            ids,
            network,
            managers,
            stores,
            factory: BlockFactory::with_seed(seed),
        }
    }

    /// Commits `blocks` on `node` as if its consensus produced them.
    pub async fn produce(&self, node: usize, blocks: &[Block]) {
        for block in blocks {
            let previous = *block.previous_l1_commitment().expect("not the origin");
            let draft = StateDraft::with_mutations(previous, block.state_index() - 1, block.mutations().clone());
            let produced = within(
                self.managers[node].consensus_produced_block(CancellationToken::new(), draft),
            )
            .await
            .expect("responder kept")
            .expect("block committed");
            assert_eq!(produced, *block);
        }
    }
}

/// Awaits `fut`, failing the test after `STEP_TIMEOUT`.
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, fut)
        .await
        .expect("step timed out")
}
