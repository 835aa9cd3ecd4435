use serde::{Deserialize, Serialize};
use shared_types::{Block, State};

/// Difference between two chain tips, as needed by the mempool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDiff {
    /// State at the new tip.
    pub new_state: State,
    /// Blocks on the new chain after the common ancestor, increasing index.
    pub added: Vec<Block>,
    /// Blocks on the old chain after the common ancestor, increasing index.
    pub removed: Vec<Block>,
}

/// Counters kept by the state manager for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateManagerMetrics {
    /// Blocks received from peers that someone was waiting for.
    pub blocks_received: u64,
    /// Blocks received from peers that nobody was waiting for.
    pub blocks_ignored: u64,
    /// `GetBlock` messages sent, counting each recipient.
    pub get_block_sent: u64,
    /// `GetBlock` messages answered with a block.
    pub get_block_served: u64,
    pub requests_completed: u64,
    pub requests_abandoned: u64,
    /// States deleted from the store by pruning.
    pub states_pruned: u64,
}
