//! # Quantum-Chain Test Suite
//!
//! Integration tests running several state managers against each other.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── mod.rs          # Cluster fixture, tracing setup
//!     ├── state_sync.rs   # Block fetching and state reconstruction
//!     └── state_diff.rs   # Reorg diffs for the mempool
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qc-tests
//!
//! # With protocol logs
//! RUST_LOG=qc_04_state_manager=debug cargo test -p qc-tests -- --nocapture
//! ```

pub mod integration;
