//! Chain reconciliation for GossipChain
//!
//! Every `RESPONSE_CHAIN` a peer sends ends up here as a [`ChainFragment`].
//! The synchronizer decides whether to:
//! - ignore it (our chain is at least as long),
//! - append its last block (it extends our latest block directly),
//! - ask every peer for their full chain (a lone block we cannot link), or
//! - adopt it wholesale (a longer chain valid from genesis).

use crate::blockchain::{Block, SharedChain};
use crate::network::{GossipMessage, PeerId, PeerRegistry};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A chain fragment received from a peer, in arrival order.
#[derive(Debug, Clone)]
pub struct ChainFragment {
    pub peer_id: PeerId,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to look at.
    Empty,
    /// The held chain is already at least as long.
    AlreadyCurrent,
    /// The received latest block extended the held chain.
    Appended,
    /// A single unlinked block; full chains were requested from every peer.
    RequestedFullChain,
    /// The held chain was replaced; the new latest block was announced.
    Replaced,
    /// The fragment was invalid or not actually longer.
    Rejected,
}

/// Sync statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub fragments_received: u64,
    pub blocks_appended: u64,
    pub chains_replaced: u64,
    pub full_chain_queries: u64,
    pub fragments_rejected: u64,
}

impl SyncStats {
    fn record(&mut self, outcome: &ReconcileOutcome) {
        self.fragments_received += 1;
        match outcome {
            ReconcileOutcome::Appended => self.blocks_appended += 1,
            ReconcileOutcome::Replaced => self.chains_replaced += 1,
            ReconcileOutcome::RequestedFullChain => self.full_chain_queries += 1,
            ReconcileOutcome::Rejected => self.fragments_rejected += 1,
            ReconcileOutcome::Empty | ReconcileOutcome::AlreadyCurrent => {}
        }
    }
}

/// Sole consumer of inbound chain fragments.
#[derive(Clone)]
pub struct ChainSynchronizer {
    chain: SharedChain,
    peers: PeerRegistry,
    stats: Arc<Mutex<SyncStats>>,
}

impl ChainSynchronizer {
    pub fn new(chain: SharedChain, peers: PeerRegistry) -> Self {
        Self {
            chain,
            peers,
            stats: Arc::new(Mutex::new(SyncStats::default())),
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.lock().clone()
    }

    /// Processes fragments until every sender is gone.
    pub async fn run(self, mut fragments: mpsc::UnboundedReceiver<ChainFragment>) {
        info!("chain synchronizer started");
        while let Some(fragment) = fragments.recv().await {
            let peer_id = fragment.peer_id;
            let outcome = self.reconcile(fragment.blocks).await;
            debug!(%peer_id, ?outcome, "fragment reconciled");
        }
        info!("chain synchronizer stopped");
    }

    pub async fn reconcile(&self, mut blocks: Vec<Block>) -> ReconcileOutcome {
        blocks.sort_by_key(|b| b.index);

        let mut announce = None;
        let outcome = match blocks.last().cloned() {
            None => ReconcileOutcome::Empty,
            Some(received_latest) => {
                // Held for the whole read-latest / validate / mutate sequence.
                let mut chain = self.chain.write().await;
                let held_latest = chain.latest().clone();

                if received_latest.index <= held_latest.index {
                    debug!(
                        held = held_latest.index,
                        received = received_latest.index,
                        "received chain is not longer than current chain, nothing to do"
                    );
                    ReconcileOutcome::AlreadyCurrent
                } else {
                    info!(
                        held = held_latest.index,
                        received = received_latest.index,
                        "chain possibly behind"
                    );
                    if held_latest.hash == received_latest.previous_hash {
                        if chain.append(received_latest) {
                            ReconcileOutcome::Appended
                        } else {
                            ReconcileOutcome::Rejected
                        }
                    } else if blocks.len() == 1 {
                        ReconcileOutcome::RequestedFullChain
                    } else if chain.replace_if_better(blocks) {
                        announce = Some(chain.latest().clone());
                        ReconcileOutcome::Replaced
                    } else {
                        ReconcileOutcome::Rejected
                    }
                }
            }
        };

        match (&outcome, announce) {
            (ReconcileOutcome::RequestedFullChain, _) => {
                info!("querying full chains from peers");
                self.peers.broadcast(&GossipMessage::QueryAll);
            }
            (ReconcileOutcome::Replaced, Some(latest)) => {
                self.peers
                    .broadcast(&GossipMessage::ResponseChain(vec![latest]));
            }
            _ => {}
        }

        self.stats.lock().record(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Blockchain;
    use crate::network::PeerDirection;
    use std::time::Duration;

    fn extend(blocks: &mut Vec<Block>, data: &str) {
        let prev = blocks.last().unwrap().clone();
        blocks.push(Block::new(prev.index + 1, prev.hash, prev.timestamp + 1, data.to_string()));
    }

    /// Held chain `[G, B1]` plus a peer listening on the returned receiver.
    async fn setup() -> (
        ChainSynchronizer,
        SharedChain,
        Vec<Block>,
        mpsc::UnboundedReceiver<GossipMessage>,
    ) {
        let chain = Blockchain::shared();
        let peers = PeerRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        peers.register("ws://peer:6001", PeerDirection::Outbound, tx);

        let mut blocks = vec![Block::genesis()];
        extend(&mut blocks, "b1");
        assert!(chain.write().await.append(blocks[1].clone()));

        (ChainSynchronizer::new(chain.clone(), peers), chain, blocks, rx)
    }

    #[tokio::test]
    async fn test_contiguous_block_is_appended_without_requery() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (sync, chain, mut blocks, mut rx) = setup().await;
            extend(&mut blocks, "b2");

            let outcome = sync.reconcile(vec![blocks[2].clone()]).await;
            assert_eq!(outcome, ReconcileOutcome::Appended);
            assert_eq!(chain.read().await.latest(), &blocks[2]);
            assert!(rx.try_recv().is_err());
        })
        .await
        .expect("test_contiguous_block_is_appended_without_requery timed out");
    }

    #[tokio::test]
    async fn test_same_fragment_twice_appends_once() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (sync, chain, mut blocks, _rx) = setup().await;
            extend(&mut blocks, "b2");

            assert_eq!(sync.reconcile(vec![blocks[2].clone()]).await, ReconcileOutcome::Appended);
            assert_eq!(
                sync.reconcile(vec![blocks[2].clone()]).await,
                ReconcileOutcome::AlreadyCurrent
            );
            assert_eq!(chain.read().await.len(), 3);
        })
        .await
        .expect("test_same_fragment_twice_appends_once timed out");
    }

    #[tokio::test]
    async fn test_single_block_gap_requests_full_chains() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (sync, chain, mut blocks, mut rx) = setup().await;
            for data in ["b2", "b3", "b4", "b5"] {
                extend(&mut blocks, data);
            }

            let outcome = sync.reconcile(vec![blocks[5].clone()]).await;
            assert_eq!(outcome, ReconcileOutcome::RequestedFullChain);
            assert_eq!(rx.recv().await.unwrap(), GossipMessage::QueryAll);
            assert_eq!(chain.read().await.len(), 2);
        })
        .await
        .expect("test_single_block_gap_requests_full_chains timed out");
    }

    #[tokio::test]
    async fn test_longer_valid_chain_is_adopted_and_announced() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (sync, chain, _blocks, mut rx) = setup().await;
            let mut fork = vec![Block::genesis()];
            for data in ["x1", "x2", "x3"] {
                extend(&mut fork, data);
            }

            // Arrival order is irrelevant: fragments are sorted by index.
            let mut shuffled = fork.clone();
            shuffled.reverse();

            let outcome = sync.reconcile(shuffled).await;
            assert_eq!(outcome, ReconcileOutcome::Replaced);
            assert_eq!(chain.read().await.blocks(), fork.as_slice());
            assert_eq!(
                rx.recv().await.unwrap(),
                GossipMessage::ResponseChain(vec![fork[3].clone()])
            );
        })
        .await
        .expect("test_longer_valid_chain_is_adopted_and_announced timed out");
    }

    #[tokio::test]
    async fn test_shorter_or_corrupted_chain_is_rejected() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (sync, chain, blocks, mut rx) = setup().await;

            assert_eq!(
                sync.reconcile(vec![Block::genesis()]).await,
                ReconcileOutcome::AlreadyCurrent
            );

            let mut fork = vec![Block::genesis()];
            for data in ["x1", "x2", "x3"] {
                extend(&mut fork, data);
            }
            fork[2].hash = "ab".repeat(32);
            assert_eq!(sync.reconcile(fork).await, ReconcileOutcome::Rejected);

            assert_eq!(chain.read().await.blocks(), blocks.as_slice());
            assert!(rx.try_recv().is_err());

            let stats = sync.stats();
            assert_eq!(stats.fragments_received, 2);
            assert_eq!(stats.fragments_rejected, 1);
        })
        .await
        .expect("test_shorter_or_corrupted_chain_is_rejected timed out");
    }

    #[tokio::test]
    async fn test_run_drains_fragment_channel() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (sync, chain, mut blocks, _rx) = setup().await;
            extend(&mut blocks, "b2");

            let (fragment_tx, fragment_rx) = mpsc::unbounded_channel();
            let task = tokio::spawn(sync.clone().run(fragment_rx));
            fragment_tx
                .send(ChainFragment {
                    peer_id: sync.peers.summaries()[0].id,
                    blocks: vec![blocks[2].clone()],
                })
                .unwrap();
            drop(fragment_tx);
            task.await.unwrap();

            assert_eq!(chain.read().await.len(), 3);
            assert_eq!(sync.stats().blocks_appended, 1);
        })
        .await
        .expect("test_run_drains_fragment_channel timed out");
    }
}
