//! # Block Cache
//!
//! In-memory map from block hash to block. Entries expire a fixed time after
//! insertion; lookups do not extend their lifetime. Expired entries are
//! removed by `clean_older_than`, which the timer tick drives.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use shared_types::{Block, BlockHash};
use tracing::debug;

use crate::ports::TimeProvider;

#[derive(Debug)]
pub struct BlockCache {
    blocks: HashMap<BlockHash, Block>,
    /// Insertion times, oldest first.
    times: VecDeque<(SystemTime, BlockHash)>,
    time_provider: Arc<dyn TimeProvider>,
}

impl BlockCache {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            blocks: HashMap::new(),
            times: VecDeque::new(),
            time_provider,
        }
    }

    /// Adds a block. Returns `false` if it was already cached, in which case
    /// its insertion time is left untouched.
    pub fn add_block(&mut self, block: Block) -> bool {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return false;
        }
        self.times.push_back((self.time_provider.now(), hash));
        self.blocks.insert(hash, block);
        true
    }

    pub fn get_block(&self, hash: &BlockHash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Removes every block inserted before `limit`. Returns how many were removed.
    pub fn clean_older_than(&mut self, limit: SystemTime) -> usize {
        let mut removed = 0;
        while let Some((inserted, _)) = self.times.front() {
            if *inserted >= limit {
                break;
            }
            if let Some((_, hash)) = self.times.pop_front() {
                self.blocks.remove(&hash);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("[qc-04] Block cache: removed {} expired blocks, {} remain", removed, self.blocks.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
