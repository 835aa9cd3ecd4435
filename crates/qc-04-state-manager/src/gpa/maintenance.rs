//! Timer driven housekeeping: status logging, cache eviction, request
//! cleaning and `GetBlock` retries.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use shared_types::{BlockHash, L1Commitment};
use tracing::debug;

use super::StateManagerGpa;
use crate::domain::{RequestId, RequestKind};
use crate::events::OutMessages;
use crate::ports::BlockStore;

impl<S: BlockStore> StateManagerGpa<S> {
    pub(super) fn handle_timer_tick(&mut self, now: SystemTime) -> OutMessages {
        let timers = &self.config.timers;
        let status_due = now > self.last_status_log_time + timers.status_log_period;
        let cache_due = now > self.last_clean_block_cache_time + timers.block_cache_block_cleaning_period;
        let requests_due = now > self.last_clean_requests_time + timers.request_cleaning_period;
        let retry_due = now > self.last_get_blocks_time + timers.get_block_retry_period;
        let cache_limit = now
            .checked_sub(timers.block_cache_blocks_in_cache_duration)
            .unwrap_or(UNIX_EPOCH);

        if status_due {
            debug!("[qc-04] {}", self.status_string());
            self.last_status_log_time = now;
        }
        if cache_due {
            self.block_cache.clean_older_than(cache_limit);
            self.last_clean_block_cache_time = now;
        }
        if requests_due {
            self.clean_requests();
            self.last_clean_requests_time = now;
        }

        let mut out = Vec::new();
        if retry_due {
            if !self.blocks_to_fetch.is_empty() {
                self.clean_requests();
                let commitments: Vec<L1Commitment> = self.blocks_to_fetch.commitments().copied().collect();
                if !commitments.is_empty() {
                    debug!("[qc-04] Requesting {} missing blocks again", commitments.len());
                }
                for commitment in &commitments {
                    out.extend(self.get_block_messages(commitment));
                }
            }
            self.last_get_blocks_time = now;
        }
        out
    }

    /// Forgets requests nobody awaits and every fetcher left without a
    /// waiting request or a live fetcher stacked on it.
    pub(super) fn clean_requests(&mut self) {
        let requests_before = self.requests.len();
        self.diffs.retain(|_, diff| diff.is_valid());
        let diffs = &self.diffs;
        self.requests.retain(|_, request| {
            request.is_valid()
                && match request.kind() {
                    RequestKind::MempoolDiff { diff, .. } => diffs.contains_key(diff),
                    _ => true,
                }
        });

        let requests = &self.requests;
        let is_valid = |id: RequestId| requests.contains_key(&id);
        let mut fetchers_removed = 0;
        loop {
            let alive: HashSet<BlockHash> = self.blocks_fetched.hashes().copied().collect();
            let is_related_alive = |hash: &BlockHash| alive.contains(hash);
            let removed = self.blocks_fetched.clean_callbacks(is_valid, is_related_alive)
                + self.blocks_to_fetch.clean_callbacks(is_valid, is_related_alive);
            if removed == 0 {
                break;
            }
            fetchers_removed += removed;
        }

        let requests_removed = requests_before - self.requests.len();
        if requests_removed > 0 || fetchers_removed > 0 {
            debug!(
                "[qc-04] Cleaned {} requests and {} fetchers",
                requests_removed, fetchers_removed
            );
        }
    }
}
