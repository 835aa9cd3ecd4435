//! # Peer Envelope
//!
//! Wrapper for every message exchanged between the nodes of one chain.
//!
//! ## Properties
//!
//! - **Chain scoping**: the `peering_id` is derived from the chain id and the
//!   name of the subsystem, so subsystems of different chains never see each
//!   other's traffic.
//! - **Type tagging**: `msg_type` is a discriminator byte interpreted by the
//!   receiving subsystem; the payload is opaque at this level.
//! - **Versioning**: all envelopes carry a `version` for forward compatibility.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::entities::{ChainId, Hash, NodeId};

/// Peering namespace of one subsystem of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeeringId(pub Hash);

impl PeeringId {
    /// Derives the namespace `chain_id × subsystem`.
    pub fn for_chain(chain_id: &ChainId, subsystem: &str) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(chain_id.0);
        hasher.update(subsystem.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for PeeringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// A type-tagged message travelling inside a peering namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEnvelope {
    /// Protocol version for forward compatibility.
    pub version: u16,
    /// Namespace the message belongs to.
    pub peering_id: PeeringId,
    /// Node that sent the message. Filled in by the sending side.
    pub sender: NodeId,
    /// Discriminator of the payload type.
    pub msg_type: u8,
    /// Encoded message body.
    pub payload: Vec<u8>,
}

impl PeerEnvelope {
    /// Current protocol version.
    pub const CURRENT_VERSION: u16 = 1;

    pub fn new(peering_id: PeeringId, sender: NodeId, msg_type: u8, payload: Vec<u8>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            peering_id,
            sender,
            msg_type,
            payload,
        }
    }

    #[must_use]
    pub fn is_supported_version(&self) -> bool {
        self.version == Self::CURRENT_VERSION
    }
}
