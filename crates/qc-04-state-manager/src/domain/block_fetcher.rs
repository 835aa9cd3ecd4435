//! # Block Fetchers
//!
//! A `BlockFetcher` gathers everyone waiting on one block:
//!
//! - **callbacks**: requests whose backward trace stopped at this block.
//! - **related**: fetchers of blocks built directly on top of this one. They
//!   were stacked while tracing a chain backward over several missing blocks
//!   and can only resolve after this one does.
//!
//! `BlockFetchers` is a registry of fetchers keyed by block hash. The state
//! manager keeps two of them: blocks still to be fetched from peers, and
//! blocks already cached that wait for an ancestor.
//!
//! ```text
//!   blocks_to_fetch           blocks_fetched
//!   ┌──────────┐  related   ┌──────────┐  related   ┌──────────┐
//!   │ block 5  │ ─────────→ │ block 6  │ ─────────→ │ block 7  │ ← callbacks
//!   └──────────┘            └──────────┘            └──────────┘
//! ```

use std::collections::{HashMap, VecDeque};

use shared_types::{BlockHash, L1Commitment, StateIndex};

use crate::domain::block_request::RequestId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFetcher {
    state_index: StateIndex,
    commitment: L1Commitment,
    callbacks: Vec<RequestId>,
    related: Vec<BlockHash>,
}

impl BlockFetcher {
    pub fn with_callback(state_index: StateIndex, commitment: L1Commitment, callback: RequestId) -> Self {
        Self {
            state_index,
            commitment,
            callbacks: vec![callback],
            related: Vec::new(),
        }
    }

    pub fn with_related(state_index: StateIndex, commitment: L1Commitment, related: BlockHash) -> Self {
        Self {
            state_index,
            commitment,
            callbacks: Vec::new(),
            related: vec![related],
        }
    }

    pub fn state_index(&self) -> StateIndex {
        self.state_index
    }

    pub fn commitment(&self) -> &L1Commitment {
        &self.commitment
    }

    pub fn block_hash(&self) -> &BlockHash {
        &self.commitment.block_hash
    }

    pub fn callbacks(&self) -> &[RequestId] {
        &self.callbacks
    }

    pub fn related(&self) -> &[BlockHash] {
        &self.related
    }

    pub fn add_callback(&mut self, callback: RequestId) {
        if !self.callbacks.contains(&callback) {
            self.callbacks.push(callback);
        }
    }

    pub fn add_related(&mut self, related: BlockHash) {
        if !self.related.contains(&related) {
            self.related.push(related);
        }
    }

    /// Nobody waits on this fetcher any more.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty() && self.related.is_empty()
    }

    /// Drops callbacks and related links that are no longer alive, in place.
    /// Returns how many entries were dropped.
    pub fn clean_callbacks(
        &mut self,
        is_valid: impl Fn(RequestId) -> bool,
        is_related_alive: impl Fn(&BlockHash) -> bool,
    ) -> usize {
        let before = self.callbacks.len() + self.related.len();
        self.callbacks.retain(|id| is_valid(*id));
        self.related.retain(|hash| is_related_alive(hash));
        before - self.callbacks.len() - self.related.len()
    }

    fn merge(&mut self, other: BlockFetcher) {
        for callback in other.callbacks {
            self.add_callback(callback);
        }
        for related in other.related {
            self.add_related(related);
        }
    }
}

/// Result of resolving a fetcher together with the fetchers stacked on it.
#[derive(Debug, Default)]
pub struct NotifyOutcome {
    /// Fetchers that resolved, parents before the fetchers built on them.
    pub resolved: Vec<BlockFetcher>,
    /// Fetchers the walk stopped at; their related fetchers were not visited.
    pub stalled: Vec<BlockFetcher>,
}

#[derive(Debug, Default)]
pub struct BlockFetchers {
    fetchers: HashMap<BlockHash, BlockFetcher>,
}

impl BlockFetchers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending fetch, merging into an existing one for the same block.
    pub fn add_fetcher(&mut self, fetcher: BlockFetcher) {
        match self.fetchers.get_mut(fetcher.block_hash()) {
            Some(existing) => existing.merge(fetcher),
            None => {
                self.fetchers.insert(*fetcher.block_hash(), fetcher);
            }
        }
    }

    /// Adds a waiting request to the fetcher of `hash`, if there is one.
    pub fn add_callback(&mut self, hash: &BlockHash, callback: RequestId) -> bool {
        match self.fetchers.get_mut(hash) {
            Some(fetcher) => {
                fetcher.add_callback(callback);
                true
            }
            None => false,
        }
    }

    /// Stacks the fetcher of `related` on the fetcher of `hash`, if there is one.
    pub fn add_related_fetcher(&mut self, hash: &BlockHash, related: BlockHash) -> bool {
        match self.fetchers.get_mut(hash) {
            Some(fetcher) => {
                fetcher.add_related(related);
                true
            }
            None => false,
        }
    }

    pub fn take_fetcher(&mut self, hash: &BlockHash) -> Option<BlockFetcher> {
        self.fetchers.remove(hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.fetchers.contains_key(hash)
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&BlockFetcher> {
        self.fetchers.get(hash)
    }

    pub fn commitments(&self) -> impl Iterator<Item = &L1Commitment> {
        self.fetchers.values().map(BlockFetcher::commitment)
    }

    pub fn hashes(&self) -> impl Iterator<Item = &BlockHash> {
        self.fetchers.keys()
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Total number of requests waiting in this registry.
    pub fn callback_count(&self) -> usize {
        self.fetchers.values().map(|f| f.callbacks.len()).sum()
    }

    /// Drops dead callbacks and related links from every fetcher and removes
    /// fetchers nobody waits on any more. Returns the number of removed fetchers.
    pub fn clean_callbacks(
        &mut self,
        is_valid: impl Fn(RequestId) -> bool,
        is_related_alive: impl Fn(&BlockHash) -> bool,
    ) -> usize {
        let before = self.fetchers.len();
        self.fetchers.retain(|_, fetcher| {
            fetcher.clean_callbacks(&is_valid, &is_related_alive);
            !fetcher.is_empty()
        });
        before - self.fetchers.len()
    }

    /// Resolves `fetcher` and then, breadth first, every fetcher of this
    /// registry stacked on it through related links.
    ///
    /// `notify_fun` is asked once per fetcher whether it can resolve. When it
    /// refuses, the fetcher is reported as stalled and the fetchers stacked
    /// on it stay in the registry untouched.
    pub fn notify_fetched(
        &mut self,
        fetcher: BlockFetcher,
        mut notify_fun: impl FnMut(&BlockFetcher) -> bool,
    ) -> NotifyOutcome {
        let mut outcome = NotifyOutcome::default();
        let mut queue = VecDeque::from([fetcher]);
        while let Some(current) = queue.pop_front() {
            if !notify_fun(&current) {
                outcome.stalled.push(current);
                continue;
            }
            for related in &current.related {
                if let Some(next) = self.fetchers.remove(related) {
                    queue.push_back(next);
                }
            }
            outcome.resolved.push(current);
        }
        outcome
    }
}
