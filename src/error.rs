//! Error types for GossipChain

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::network::PeerId;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid chain: {0}")]
    InvalidChain(String),
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Peer {0} not found")]
    PeerNotFound(PeerId),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tungstenite::Error),
    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
