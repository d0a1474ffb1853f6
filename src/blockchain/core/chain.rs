use crate::blockchain::core::validation::{validate_chain, validate_successor};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const GENESIS_INDEX: u64 = 0;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_TIMESTAMP: i64 = 1465154705;
pub const GENESIS_DATA: &str = "my genesis block!!";
/// Pre-computed digest of the genesis block. Treated as a constant, never recomputed.
pub const GENESIS_HASH: &str = "816534932c2b7154836da6afc367695e6337db8a921823784c14378abed4f7d7";

/// Chain store shared between the HTTP handlers, the protocol loops and the synchronizer.
pub type SharedChain = Arc<RwLock<Blockchain>>;

/// Digest over `index ‖ previousHash ‖ timestamp ‖ data`, lowercase hex.
///
/// Integers are rendered in plain decimal so that every implementation of the
/// protocol derives the same digest (and the genesis constant above).
pub fn calculate_hash(index: u64, previous_hash: &str, timestamp: i64, data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string().as_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    pub data: String,
    pub hash: String,
}

impl Block {
    /// Builds a block and seals it with its own digest.
    pub fn new(index: u64, previous_hash: String, timestamp: i64, data: String) -> Self {
        let hash = calculate_hash(index, &previous_hash, timestamp, &data);
        Block {
            index,
            previous_hash,
            timestamp,
            data,
            hash,
        }
    }

    /// The hard-coded first block every valid chain must share.
    pub fn genesis() -> Self {
        Block {
            index: GENESIS_INDEX,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            timestamp: GENESIS_TIMESTAMP,
            data: GENESIS_DATA.to_string(),
            hash: GENESIS_HASH.to_string(),
        }
    }

    /// Successor of `previous` carrying `data`, stamped with the current time.
    pub fn next(previous: &Block, data: String) -> Self {
        let timestamp = chrono::Utc::now().timestamp();
        Block::new(previous.index + 1, previous.hash.clone(), timestamp, data)
    }

    pub fn calculate_hash(&self) -> String {
        calculate_hash(self.index, &self.previous_hash, self.timestamp, &self.data)
    }

    pub fn is_genesis(&self) -> bool {
        *self == Block::genesis()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index: {}, previousHash: {}, timestamp: {}, data: {}, hash: {}",
            self.index, self.previous_hash, self.timestamp, self.data, self.hash
        )
    }
}

/// The authoritative chain held by this node.
///
/// Never empty: it starts at the genesis block and is only ever extended by a
/// valid successor or replaced wholesale by a longer valid chain.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Blockchain {
    pub fn new() -> Self {
        Blockchain {
            blocks: vec![Block::genesis()],
        }
    }

    pub fn shared() -> SharedChain {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn latest(&self) -> &Block {
        // `blocks` always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn generate_next_block(&self, data: String) -> Block {
        Block::next(self.latest(), data)
    }

    /// Appends `block` if it is a valid successor of the latest block.
    /// Anything else is discarded and the chain is left untouched.
    pub fn append(&mut self, block: Block) -> bool {
        match validate_successor(&block, self.latest()) {
            Ok(()) => {
                debug!(index = block.index, hash = %block.hash, "block appended");
                self.blocks.push(block);
                true
            }
            Err(e) => {
                warn!(index = block.index, "discarding block: {}", e);
                false
            }
        }
    }

    /// Replaces the held chain when `candidate` is valid from genesis and strictly longer.
    pub fn replace_if_better(&mut self, candidate: Vec<Block>) -> bool {
        if let Err(e) = validate_chain(&candidate) {
            warn!(length = candidate.len(), "received chain rejected: {}", e);
            return false;
        }
        if candidate.len() <= self.blocks.len() {
            debug!(
                received = candidate.len(),
                held = self.blocks.len(),
                "received chain is not longer than the held chain"
            );
            return false;
        }
        info!(
            received = candidate.len(),
            held = self.blocks.len(),
            "replacing current chain with received chain"
        );
        self.blocks = candidate;
        true
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}
