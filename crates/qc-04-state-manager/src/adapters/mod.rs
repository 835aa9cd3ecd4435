//! # Adapters
//!
//! Implementations of the outbound ports for tests and single-process nodes.

pub mod memory_store;
pub mod network;
pub mod time;

pub use memory_store::InMemoryBlockStore;
pub use network::InMemoryPeeringNetwork;
pub use time::{ArtificialTimeProvider, SystemTimeProvider, TokioTimeProvider};
