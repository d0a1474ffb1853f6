use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::message::GossipMessage;
use crate::error::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PeerId(u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    pub id: PeerId,
    pub address: String,
    pub direction: PeerDirection,
    pub connected_secs: u64,
}

struct PeerHandle {
    address: String,
    direction: PeerDirection,
    sender: mpsc::UnboundedSender<GossipMessage>,
    connected_at: Instant,
}

/// The set of live peers.
///
/// Each peer is represented by the queue feeding its writer task. Every
/// mutation happens under the exclusive lock, so `broadcast` pruning and a
/// connection's own removal-on-disconnect never interleave.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    peers: RwLock<HashMap<PeerId, PeerHandle>>,
    next_id: AtomicU64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        address: impl Into<String>,
        direction: PeerDirection,
        sender: mpsc::UnboundedSender<GossipMessage>,
    ) -> PeerId {
        let peer_id = PeerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let address = address.into();
        info!(%peer_id, %address, ?direction, "peer registered");
        self.inner.peers.write().insert(
            peer_id,
            PeerHandle {
                address,
                direction,
                sender,
                connected_at: Instant::now(),
            },
        );
        peer_id
    }

    /// Removes a peer. Returns false if it was already gone.
    pub fn remove(&self, peer_id: PeerId) -> bool {
        match self.inner.peers.write().remove(&peer_id) {
            Some(handle) => {
                info!(%peer_id, address = %handle.address, "peer removed");
                true
            }
            None => false,
        }
    }

    /// Unicast to one peer; a closed queue removes the peer.
    pub fn send(&self, peer_id: PeerId, message: GossipMessage) -> Result<(), ChainError> {
        let mut peers = self.inner.peers.write();
        let handle = peers.get(&peer_id).ok_or(ChainError::PeerNotFound(peer_id))?;
        if handle.sender.send(message).is_err() {
            let address = handle.address.clone();
            peers.remove(&peer_id);
            info!(%peer_id, %address, "peer disconnected, removed from registry");
            return Err(ChainError::NetworkError(format!(
                "Peer {} ({}) is no longer reachable",
                peer_id, address
            )));
        }
        Ok(())
    }

    /// Sends `message` to every live peer, dropping those whose queue is closed.
    /// Returns the number of peers the message was handed to.
    pub fn broadcast(&self, message: &GossipMessage) -> usize {
        let mut peers = self.inner.peers.write();
        let before = peers.len();
        peers.retain(|peer_id, handle| {
            if handle.sender.send(message.clone()).is_ok() {
                true
            } else {
                info!(%peer_id, address = %handle.address, "peer disconnected, removed from registry");
                false
            }
        });
        let delivered = peers.len();
        debug!(kind = ?message.kind(), delivered, pruned = before - delivered, "broadcast");
        delivered
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut peers: Vec<_> = self
            .inner
            .peers
            .read()
            .iter()
            .map(|(id, handle)| (*id, handle.address.clone()))
            .collect();
        peers.sort_by_key(|(id, _)| *id);
        peers.into_iter().map(|(_, address)| address).collect()
    }

    pub fn summaries(&self) -> Vec<PeerSummary> {
        let mut summaries: Vec<_> = self
            .inner
            .peers
            .read()
            .iter()
            .map(|(id, handle)| PeerSummary {
                id: *id,
                address: handle.address.clone(),
                direction: handle.direction,
                connected_secs: handle.connected_at.elapsed().as_secs(),
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.inner.peers.read().contains_key(&peer_id)
    }

    pub fn len(&self) -> usize {
        self.inner.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
