//! # Domain Layer
//!
//! Pure state manager logic: no I/O, no clocks other than the injected
//! `TimeProvider`.

pub mod block_cache;
pub mod block_fetcher;
pub mod block_request;
pub mod chain_of_blocks;
pub mod committed_chain;
pub mod errors;
pub mod node_randomiser;
pub mod value_objects;

pub use block_cache::BlockCache;
pub use block_fetcher::{BlockFetcher, BlockFetchers, NotifyOutcome};
pub use block_request::{
    BlockRequest, Completion, DiffSide, MempoolDiffRequest, RequestId, RequestKind,
};
pub use chain_of_blocks::ChainOfBlocks;
pub use committed_chain::{BlockInfo, CommittedChain};
pub use errors::StateManagerError;
pub use node_randomiser::NodeRandomiser;
pub use value_objects::{StateDiff, StateManagerMetrics};
