//! # Integration Tests
//!
//! State managers run as real actors on a paused tokio runtime and talk
//! through an in-process peering network. Timer-driven retries advance with
//! the paused clock, so every scenario is deterministic and fast.

pub mod state_diff;
pub mod state_sync;

#[cfg(test)]
mod fixture;
