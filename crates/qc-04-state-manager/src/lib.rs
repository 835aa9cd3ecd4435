//! # qc-04-state-manager
//!
//! Chain state manager for Quantum-Chain.
//!
//! ## Role in System
//!
//! - **Block Availability**: makes the chain behind a consensus proposal or
//!   decision available locally, fetching missing blocks from peers
//! - **State Reconstruction**: replays fetched blocks onto the nearest
//!   committed state and commits the result
//! - **Mempool Support**: computes the blocks added and removed between two
//!   chain tips
//! - **Pruning**: deletes the oldest committed states beyond a configured
//!   window after each commit
//!
//! ## Request Flow
//!
//! ```text
//! [Consensus] ──proposal / decided / produced──→ ┌──────────────┐
//! [Chain]     ──diff / confirmed output────────→ │ StateManager │ ←─ timer tick
//!                                                │   (actor)    │
//!                                                └──────┬───────┘
//!                                                       │ Input / PeerMessage
//!                                                       ↓
//!                                          ┌────────────────────────┐
//!                                          │    StateManagerGpa     │
//!                                          │ cache · fetchers · req │
//!                                          └──┬──────────────────┬──┘
//!                                             │                  │
//!                                  GetBlock / Block         BlockStore
//!                                             ↓
//!                                      [Peering network]
//! ```
//!
//! ## Layout
//!
//! - `domain`: cache, fetchers, requests, chain walks, peer selection
//! - `gpa`: the deterministic protocol core
//! - `service`: the tokio actor and the `StateManagerApi` handle
//! - `ports` / `adapters`: clock, store and network boundaries

pub mod adapters;
pub mod config;
pub mod domain;
pub mod events;
pub mod gpa;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::*;
pub use config::{StateManagerConfig, StateManagerTimers};
pub use domain::*;
pub use events::*;
pub use gpa::StateManagerGpa;
pub use ports::*;
pub use service::StateManager;
