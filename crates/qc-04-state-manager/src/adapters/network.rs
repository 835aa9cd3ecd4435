//! In-process peering network.
//!
//! Connects state managers running in one process, keyed by peering id and
//! node id. Nodes can be cut off to simulate unreachable peers; envelopes
//! sent to or from them are silently lost.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use shared_types::{NodeId, PeerEnvelope, PeeringId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ports::PeeringNetwork;

#[derive(Debug, Default)]
pub struct InMemoryPeeringNetwork {
    endpoints: RwLock<HashMap<(PeeringId, NodeId), mpsc::UnboundedSender<PeerEnvelope>>>,
    disconnected: RwLock<HashSet<NodeId>>,
}

impl InMemoryPeeringNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loses all traffic to and from `node` until `reconnect` is called.
    pub fn disconnect(&self, node: &NodeId) {
        self.disconnected.write().insert(node.clone());
    }

    pub fn reconnect(&self, node: &NodeId) {
        self.disconnected.write().remove(node);
    }
}

impl PeeringNetwork for InMemoryPeeringNetwork {
    fn attach(&self, peering_id: &PeeringId, node: &NodeId) -> mpsc::UnboundedReceiver<PeerEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.write().insert((*peering_id, node.clone()), tx);
        rx
    }

    fn send(&self, to: &NodeId, envelope: PeerEnvelope) {
        {
            let disconnected = self.disconnected.read();
            if disconnected.contains(to) || disconnected.contains(&envelope.sender) {
                debug!("[qc-04] Dropping envelope {} -> {}: node disconnected", envelope.sender, to);
                return;
            }
        }
        let endpoints = self.endpoints.read();
        match endpoints.get(&(envelope.peering_id, to.clone())) {
            Some(endpoint) => {
                let _ = endpoint.send(envelope);
            }
            None => debug!("[qc-04] No endpoint for node {} in peering {}", to, envelope.peering_id),
        }
    }
}
