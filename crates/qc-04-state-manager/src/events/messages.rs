//! Peer messages of the state manager.
//!
//! Every message travels in a `PeerEnvelope` of the chain's state manager
//! peering namespace. The envelope's `msg_type` byte selects the message and
//! the payload holds its bincode encoding.

use serde::{Deserialize, Serialize};
use shared_types::{Block, L1Commitment, NodeId, PeerEnvelope, PeeringId};

use crate::domain::StateManagerError;

/// Name of the subsystem in peering namespaces.
pub const PEERING_SUBSYSTEM: &str = "StateManager";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Block = 0,
    GetBlock = 1,
}

impl TryFrom<u8> for MsgType {
    type Error = StateManagerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MsgType::Block),
            1 => Ok(MsgType::GetBlock),
            other => Err(StateManagerError::UnknownMessageType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Asks a peer for the block of a commitment. Unanswered if the peer
    /// does not have it.
    GetBlock { commitment: L1Commitment },
    /// Carries a block, usually in answer to `GetBlock`.
    Block { block: Block },
}

#[derive(Serialize, Deserialize)]
struct GetBlockBody {
    commitment: L1Commitment,
}

#[derive(Serialize, Deserialize)]
struct BlockBody {
    block: Block,
}

impl PeerMessage {
    pub fn msg_type(&self) -> MsgType {
        match self {
            PeerMessage::GetBlock { .. } => MsgType::GetBlock,
            PeerMessage::Block { .. } => MsgType::Block,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StateManagerError> {
        let payload = match self {
            PeerMessage::GetBlock { commitment } => bincode::serialize(&GetBlockBody {
                commitment: *commitment,
            }),
            PeerMessage::Block { block } => bincode::serialize(&BlockBody {
                block: block.clone(),
            }),
        };
        payload.map_err(|e| StateManagerError::MalformedMessage(e.to_string()))
    }

    pub fn decode(msg_type: u8, payload: &[u8]) -> Result<Self, StateManagerError> {
        let malformed = |e: bincode::Error| StateManagerError::MalformedMessage(e.to_string());
        match MsgType::try_from(msg_type)? {
            MsgType::GetBlock => {
                let body: GetBlockBody = bincode::deserialize(payload).map_err(malformed)?;
                Ok(PeerMessage::GetBlock {
                    commitment: body.commitment,
                })
            }
            MsgType::Block => {
                let body: BlockBody = bincode::deserialize(payload).map_err(malformed)?;
                Ok(PeerMessage::Block { block: body.block })
            }
        }
    }

    pub fn into_envelope(
        &self,
        peering_id: PeeringId,
        sender: NodeId,
    ) -> Result<PeerEnvelope, StateManagerError> {
        Ok(PeerEnvelope::new(
            peering_id,
            sender,
            self.msg_type() as u8,
            self.encode()?,
        ))
    }

    /// Decodes an envelope, returning the sender with the message.
    pub fn from_envelope(envelope: &PeerEnvelope) -> Result<(NodeId, Self), StateManagerError> {
        if !envelope.is_supported_version() {
            return Err(StateManagerError::UnsupportedVersion(envelope.version));
        }
        let message = Self::decode(envelope.msg_type, &envelope.payload)?;
        Ok((envelope.sender.clone(), message))
    }
}

/// A message the protocol core wants delivered to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutMessage {
    pub recipient: NodeId,
    pub message: PeerMessage,
}

impl OutMessage {
    pub fn new(recipient: NodeId, message: PeerMessage) -> Self {
        Self { recipient, message }
    }
}

pub type OutMessages = Vec<OutMessage>;
