//! # State Manager Configuration
//!
//! Timer periods and fan-out of the state manager. Every period is checked
//! on timer ticks, so none of them can be effectively shorter than
//! `timer_tick_period`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::SystemTimeProvider;
use crate::ports::TimeProvider;

/// Number of peers a missing block is requested from at once.
pub const DEFAULT_GET_BLOCK_NODE_COUNT: usize = 5;

/// Newest committed states never pruned.
pub const DEFAULT_PRUNING_MIN_STATES_TO_KEEP: usize = 10_000;

/// Oldest states deleted after a single commit.
pub const DEFAULT_PRUNING_MAX_STATES_TO_DELETE: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StateManagerTimers {
    /// How long a block stays in the block cache after insertion.
    pub block_cache_blocks_in_cache_duration: Duration,
    /// Minimum time between two block cache sweeps.
    pub block_cache_block_cleaning_period: Duration,
    /// Minimum time between two rounds of `GetBlock` requests for the same
    /// missing blocks.
    pub get_block_retry_period: Duration,
    /// Period of the actor's timer tick.
    pub timer_tick_period: Duration,
    /// Minimum time between two sweeps of abandoned requests.
    pub request_cleaning_period: Duration,
    /// Minimum time between two status log lines.
    pub status_log_period: Duration,
    #[serde(skip, default = "default_time_provider")]
    pub time_provider: Arc<dyn TimeProvider>,
}

fn default_time_provider() -> Arc<dyn TimeProvider> {
    Arc::new(SystemTimeProvider)
}

impl Default for StateManagerTimers {
    fn default() -> Self {
        Self {
            block_cache_blocks_in_cache_duration: Duration::from_secs(60 * 60),
            block_cache_block_cleaning_period: Duration::from_secs(60),
            get_block_retry_period: Duration::from_secs(3),
            timer_tick_period: Duration::from_secs(1),
            request_cleaning_period: Duration::from_secs(1),
            status_log_period: Duration::from_secs(60),
            time_provider: default_time_provider(),
        }
    }
}

impl StateManagerTimers {
    /// Short periods for tests.
    pub fn for_testing() -> Self {
        Self {
            block_cache_blocks_in_cache_duration: Duration::from_secs(60 * 60),
            block_cache_block_cleaning_period: Duration::from_secs(60),
            get_block_retry_period: Duration::from_millis(100),
            timer_tick_period: Duration::from_millis(20),
            request_cleaning_period: Duration::from_millis(100),
            status_log_period: Duration::from_secs(10),
            time_provider: default_time_provider(),
        }
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StateManagerConfig {
    pub timers: StateManagerTimers,
    /// Peers asked for each missing block per round.
    pub get_block_node_count: usize,
    /// Newest states of the committed chain kept on pruning. Zero disables
    /// pruning.
    pub pruning_min_states_to_keep: usize,
    /// Cap on states deleted after one commit, so a long backlog is pruned
    /// gradually.
    pub pruning_max_states_to_delete: usize,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            timers: StateManagerTimers::default(),
            get_block_node_count: DEFAULT_GET_BLOCK_NODE_COUNT,
            pruning_min_states_to_keep: DEFAULT_PRUNING_MIN_STATES_TO_KEEP,
            pruning_max_states_to_delete: DEFAULT_PRUNING_MAX_STATES_TO_DELETE,
        }
    }
}

impl StateManagerConfig {
    pub fn for_testing() -> Self {
        Self {
            timers: StateManagerTimers::for_testing(),
            get_block_node_count: DEFAULT_GET_BLOCK_NODE_COUNT,
            pruning_min_states_to_keep: DEFAULT_PRUNING_MIN_STATES_TO_KEEP,
            pruning_max_states_to_delete: DEFAULT_PRUNING_MAX_STATES_TO_DELETE,
        }
    }

    pub fn with_pruning(mut self, min_states_to_keep: usize, max_states_to_delete: usize) -> Self {
        self.pruning_min_states_to_keep = min_states_to_keep;
        self.pruning_max_states_to_delete = max_states_to_delete;
        self
    }

    pub fn pruning_enabled(&self) -> bool {
        self.pruning_min_states_to_keep > 0
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.timers = self.timers.with_time_provider(time_provider);
        self
    }
}
