//! Peer-to-peer networking for GossipChain
//!
//! - [`message`] - gossip envelope codec
//! - [`peer`] - registry of live peer connections
//! - [`protocol`] - per-message dispatch
//! - [`connection`] - WebSocket reader/writer tasks

pub mod connection;
pub mod message;
pub mod peer;
pub mod protocol;

pub use message::{GossipMessage, MessageKind};
pub use peer::{PeerDirection, PeerId, PeerRegistry, PeerSummary};
pub use protocol::GossipHandler;

use crate::blockchain::SharedChain;
use crate::error::ChainError;
use crate::sync::{ChainFragment, ChainSynchronizer, SyncStats};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, connect_async};
use tracing::{error, info, warn};

/// Connection manager: owns the peer registry, accepts and dials peers and
/// fans messages out to all of them.
pub struct NetworkNode {
    chain: SharedChain,
    handler: GossipHandler,
    synchronizer: ChainSynchronizer,
    fragments: Mutex<Option<mpsc::UnboundedReceiver<ChainFragment>>>,
}

impl NetworkNode {
    pub fn new(chain: SharedChain) -> Self {
        let peers = PeerRegistry::new();
        let (fragment_tx, fragment_rx) = mpsc::unbounded_channel();
        Self {
            handler: GossipHandler::new(chain.clone(), peers.clone(), fragment_tx),
            synchronizer: ChainSynchronizer::new(chain.clone(), peers),
            chain,
            fragments: Mutex::new(Some(fragment_rx)),
        }
    }

    pub fn chain(&self) -> &SharedChain {
        &self.chain
    }

    pub fn peers(&self) -> &PeerRegistry {
        self.handler.peers()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.synchronizer.stats()
    }

    /// Spawns the synchronizer task. Only the first call has any effect.
    pub fn start_synchronizer(&self) -> Option<JoinHandle<()>> {
        let fragments = self.fragments.lock().take()?;
        Some(tokio::spawn(self.synchronizer.clone().run(fragments)))
    }

    /// Accept loop on an already bound P2P listener; runs until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), ChainError> {
        info!(addr = %listener.local_addr()?, "listening for p2p connections");
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "p2p accept failed");
                    return Err(e.into());
                }
            };
            let handler = self.handler.clone();
            tokio::spawn(async move {
                match accept_async(stream).await {
                    Ok(ws) => {
                        connection::spawn_connection(
                            ws,
                            remote.to_string(),
                            PeerDirection::Inbound,
                            handler,
                        );
                    }
                    Err(e) => warn!(%remote, error = %e, "websocket handshake failed"),
                }
            });
        }
    }

    /// Opens an outbound connection, starts its loop and asks for the peer's latest block.
    pub async fn connect_peer(&self, address: &str) -> Result<PeerId, ChainError> {
        let url = normalize_peer_url(address)?;
        let (ws, _) = connect_async(url.as_str()).await?;
        let peer_id =
            connection::spawn_connection(ws, url, PeerDirection::Outbound, self.handler.clone());
        self.peers().send(peer_id, GossipMessage::QueryLatest)?;
        info!(%peer_id, "query latest block");
        Ok(peer_id)
    }

    /// Dials every address in turn; a bad peer is logged and skipped.
    pub async fn connect_to_peers(&self, addresses: &[String]) -> usize {
        let mut connected = 0;
        for address in addresses.iter().filter(|a| !a.trim().is_empty()) {
            match self.connect_peer(address).await {
                Ok(_) => connected += 1,
                Err(e) => warn!(%address, error = %e, "dial to peer failed"),
            }
        }
        connected
    }

    pub fn broadcast(&self, message: &GossipMessage) -> usize {
        self.peers().broadcast(message)
    }

    /// Announces the current latest block to every peer.
    pub async fn broadcast_latest(&self) -> usize {
        let latest = self.chain.read().await.latest().clone();
        self.broadcast(&GossipMessage::ResponseChain(vec![latest]))
    }

    pub fn list_peers(&self) -> Vec<String> {
        self.peers().addresses()
    }
}

/// Peer addresses may be given as `ws://host:port` or bare `host:port`.
pub fn normalize_peer_url(address: &str) -> Result<String, ChainError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ChainError::NetworkError("Empty peer address".to_string()));
    }
    if address.starts_with("ws://") || address.starts_with("wss://") {
        Ok(address.to_string())
    } else if address.contains("://") {
        Err(ChainError::NetworkError(format!(
            "Unsupported peer scheme: {}",
            address
        )))
    } else {
        Ok(format!("ws://{}", address))
    }
}
