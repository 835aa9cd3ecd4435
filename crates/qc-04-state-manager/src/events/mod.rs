//! # Events
//!
//! What flows into the state manager (local inputs, peer-set updates) and
//! between state managers (peer messages).

pub mod inputs;
pub mod messages;

pub use inputs::{Input, NodeSetUpdate};
pub use messages::{MsgType, OutMessage, OutMessages, PeerMessage, PEERING_SUBSYSTEM};
