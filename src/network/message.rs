//! Gossip wire format.
//!
//! Every frame carries one JSON envelope `{"type": <0|1|2>, "data": <string>}`.
//! For `RESPONSE_CHAIN` the `data` string is itself a JSON array of blocks.

use crate::blockchain::Block;
use crate::error::ChainError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    QueryLatest = 0,
    QueryAll = 1,
    ResponseChain = 2,
}

impl TryFrom<u8> for MessageKind {
    type Error = ChainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::QueryLatest),
            1 => Ok(MessageKind::QueryAll),
            2 => Ok(MessageKind::ResponseChain),
            other => Err(ChainError::ProtocolError(format!(
                "Unknown message type {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipMessage {
    QueryLatest,
    QueryAll,
    ResponseChain(Vec<Block>),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: u8,
    // Absent or null for queries.
    #[serde(default)]
    data: Option<String>,
}

impl GossipMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            GossipMessage::QueryLatest => MessageKind::QueryLatest,
            GossipMessage::QueryAll => MessageKind::QueryAll,
            GossipMessage::ResponseChain(_) => MessageKind::ResponseChain,
        }
    }

    pub fn encode(&self) -> Result<String, ChainError> {
        let data = match self {
            GossipMessage::ResponseChain(blocks) => serde_json::to_string(blocks)?,
            _ => String::new(),
        };
        let envelope = Envelope {
            kind: self.kind() as u8,
            data: Some(data),
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Strict decoding: any malformed envelope, unknown type, unparsable or
    /// empty chain payload is a protocol error.
    pub fn decode(text: &str) -> Result<Self, ChainError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ChainError::ProtocolError(format!("Malformed envelope: {}", e)))?;

        match MessageKind::try_from(envelope.kind)? {
            MessageKind::QueryLatest => Ok(GossipMessage::QueryLatest),
            MessageKind::QueryAll => Ok(GossipMessage::QueryAll),
            MessageKind::ResponseChain => {
                let payload = envelope.data.as_deref().unwrap_or_default();
                let blocks: Vec<Block> = serde_json::from_str(payload).map_err(|e| {
                    ChainError::ProtocolError(format!("Malformed chain payload: {}", e))
                })?;
                if blocks.is_empty() {
                    return Err(ChainError::ProtocolError(
                        "Empty chain in response".to_string(),
                    ));
                }
                Ok(GossipMessage::ResponseChain(blocks))
            }
        }
    }
}
