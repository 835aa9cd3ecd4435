//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! - **Driving Ports (Inbound):** the API consensus and the chain call
//! - **Driven Ports (Outbound):** clock, block store and peering network
//!   the host node provides

pub mod inbound;
pub mod outbound;

pub use inbound::StateManagerApi;
pub use outbound::{BlockStore, PeeringNetwork, TimeProvider};
