//! Node orchestrator: binds listeners in a fixed order, wires the gossip
//! layer to the API and keeps a heartbeat in the log.

use crate::blockchain::{Blockchain, SharedChain};
use crate::config::Config;
use crate::error::ChainError;
use crate::network::NetworkNode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Ready,
}

pub struct Node {
    pub config: Config,
    pub blockchain: SharedChain,
    pub network: Arc<NetworkNode>,
    pub state: Arc<RwLock<NodeState>>,
}

/// Installs the global fmt subscriber; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

impl Node {
    pub fn init(config: Config) -> Result<Self, ChainError> {
        config.validate()?;
        init_tracing();
        info!(
            api = %config.network.api_addr,
            p2p = %config.network.p2p_addr,
            peers = config.network.peers.len(),
            "starting GossipChain node"
        );

        let blockchain = Blockchain::shared();
        let network = Arc::new(NetworkNode::new(blockchain.clone()));
        let state = Arc::new(RwLock::new(NodeState::Booting));

        Ok(Self {
            config,
            blockchain,
            network,
            state,
        })
    }

    pub async fn start(self: Arc<Self>) -> Result<(), ChainError> {
        // 1) P2P listener; failing to bind is fatal
        let p2p_addr = self.config.p2p_socket_addr()?;
        let p2p_listener = TcpListener::bind(p2p_addr).await.map_err(|e| {
            ChainError::NetworkError(format!("P2P address {} unavailable: {}", p2p_addr, e))
        })?;

        // 2) Synchronizer before any connection can deliver a fragment
        self.network.start_synchronizer();

        let net = self.network.clone();
        tokio::spawn(async move {
            if let Err(e) = net.serve(p2p_listener).await {
                error!("P2P server failed: {}", e);
            }
        });

        // 3) Initial peers; unreachable ones are logged and skipped
        let connected = self
            .network
            .connect_to_peers(&self.config.network.peers)
            .await;
        info!(
            connected,
            configured = self.config.network.peers.len(),
            "initial peers dialed"
        );

        // 4) API listener
        let api_addr = self.config.api_socket_addr()?;
        let api_listener = TcpListener::bind(api_addr).await.map_err(|e| {
            ChainError::NetworkError(format!("API address {} unavailable: {}", api_addr, e))
        })?;

        *self.state.write().await = NodeState::Ready;

        let node = self.clone();
        tokio::spawn(async move { node.heartbeat().await });

        self.serve_api(api_listener).await
    }

    async fn heartbeat(&self) {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            let chain_length = self.blockchain.read().await.len();
            info!(
                chain_length,
                peers = self.network.peers().len(),
                "node running"
            );
        }
    }

    #[cfg(feature = "api")]
    async fn serve_api(&self, listener: TcpListener) -> Result<(), ChainError> {
        let api_node = crate::api::Node::new_shared(
            self.blockchain.clone(),
            self.network.clone(),
            Some(self.state.clone()),
        );
        crate::api::run_api_server(Arc::new(api_node), listener).await
    }

    #[cfg(not(feature = "api"))]
    async fn serve_api(&self, _listener: TcpListener) -> Result<(), ChainError> {
        Err(ChainError::ConfigError(
            "API feature not enabled in this build".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    #[test]
    fn test_init_starts_booting_with_genesis() {
        let node = Node::init(Config::default()).unwrap();
        assert_eq!(node.blockchain.try_read().unwrap().len(), 1);
        assert_eq!(*node.state.try_read().unwrap(), NodeState::Booting);
    }

    #[test]
    fn test_init_rejects_bad_listen_address() {
        let config = Config {
            network: NetworkConfig {
                api_addr: "not an address".to_string(),
                ..NetworkConfig::default()
            },
        };
        assert!(matches!(Node::init(config), Err(ChainError::ConfigError(_))));
    }
}
