use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::message::GossipMessage;
use super::peer::{PeerId, PeerRegistry};
use crate::blockchain::SharedChain;
use crate::error::ChainError;
use crate::sync::ChainFragment;

/// Dispatches decoded gossip messages for every connection.
///
/// Queries are answered on the asking connection straight from the chain
/// store; chain responses are forwarded to the synchronizer over a channel.
#[derive(Clone)]
pub struct GossipHandler {
    chain: SharedChain,
    peers: PeerRegistry,
    fragments: mpsc::UnboundedSender<ChainFragment>,
}

impl GossipHandler {
    pub fn new(
        chain: SharedChain,
        peers: PeerRegistry,
        fragments: mpsc::UnboundedSender<ChainFragment>,
    ) -> Self {
        Self {
            chain,
            peers,
            fragments,
        }
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Handles one inbound message. An error means the connection can no
    /// longer be served and must close.
    pub async fn dispatch(&self, peer_id: PeerId, message: GossipMessage) -> Result<(), ChainError> {
        match message {
            GossipMessage::QueryLatest => {
                let latest = self.chain.read().await.latest().clone();
                debug!(%peer_id, index = latest.index, "answering latest block query");
                self.peers
                    .send(peer_id, GossipMessage::ResponseChain(vec![latest]))
            }
            GossipMessage::QueryAll => {
                let blocks = self.chain.read().await.blocks().to_vec();
                debug!(%peer_id, length = blocks.len(), "answering full chain query");
                self.peers.send(peer_id, GossipMessage::ResponseChain(blocks))
            }
            GossipMessage::ResponseChain(blocks) => {
                debug!(%peer_id, length = blocks.len(), "received chain fragment");
                if self
                    .fragments
                    .send(ChainFragment { peer_id, blocks })
                    .is_err()
                {
                    warn!(%peer_id, "chain synchronizer is not running, fragment dropped");
                }
                Ok(())
            }
        }
    }
}
