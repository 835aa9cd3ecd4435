//! # Shared Types Crate
//!
//! Chain primitives shared by the node's subsystems: identities, the
//! hash-linked block model, materialized state and the peer envelope.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every subsystem agrees on what a block, a
//!   commitment and a state are by importing them from here.
//! - **Content Addressing**: blocks are identified by the hash of their
//!   contents and linked to their predecessor by `L1Commitment`.
//! - **Opaque Payloads**: the envelope only tags and scopes messages; each
//!   subsystem owns the encoding of its own payloads.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod state;

pub use entities::*;
pub use envelope::{PeerEnvelope, PeeringId};
pub use errors::*;
pub use state::{compute_trie_root, State, StateDraft};
