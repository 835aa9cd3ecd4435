//! Pruning of old committed states.

use shared_types::Block;
use tracing::{debug, error};

use super::StateManagerGpa;
use crate::domain::BlockInfo;
use crate::ports::BlockStore;

impl<S: BlockStore> StateManagerGpa<S> {
    /// Records `block` as the newest commit and prunes the states that fell
    /// out of the kept window.
    pub(super) fn blocks_committed(&mut self, block: &Block) {
        if !self.config.pruning_enabled() {
            return;
        }
        let store = self.store.as_ref();
        if let Err(e) = self.committed_chain.update(store, BlockInfo::of(block)) {
            error!(
                "[qc-04] Failed to track committed chain at block {}: {}",
                block.hash(),
                e
            );
            self.committed_chain.clear();
            return;
        }
        let keep = self.config.pruning_min_states_to_keep;
        let max_delete = self.config.pruning_max_states_to_delete;
        match self.committed_chain.prune(store, keep, max_delete) {
            Ok(0) => {}
            Ok(pruned) => {
                self.metrics.states_pruned += pruned as u64;
                debug!(
                    "[qc-04] Pruning completed, {} states pruned, oldest kept index {:?}",
                    pruned,
                    self.committed_chain.oldest().map(|info| info.state_index)
                );
            }
            Err(e) => error!("[qc-04] Pruning stopped: {}", e),
        }
    }
}
