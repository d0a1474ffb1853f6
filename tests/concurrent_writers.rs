//! Local mining and gossip reconciliation writing the same chain at once.

use gossipchain::api::Node;
use gossipchain::blockchain::{is_valid_chain, Block, Blockchain};
use gossipchain::network::NetworkNode;
use gossipchain::sync::{ChainSynchronizer, ReconcileOutcome};
use std::sync::Arc;
use std::time::Duration;

const MINERS: usize = 4;
const GOSSIPERS: usize = 4;
const ROUNDS: usize = 25;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_keep_chain_linked() {
    tokio::time::timeout(Duration::from_secs(30), async {
        let chain = Blockchain::shared();
        let network = Arc::new(NetworkNode::new(chain.clone()));
        let api = Arc::new(Node::new_shared(chain.clone(), network.clone(), None));
        let sync = ChainSynchronizer::new(chain.clone(), network.peers().clone());

        let mut miners = Vec::new();
        for m in 0..MINERS {
            let api = api.clone();
            miners.push(tokio::spawn(async move {
                for round in 0..ROUNDS {
                    api.mine_block(format!("mined {}-{}", m, round))
                        .await
                        .expect("local block rejected");
                    tokio::task::yield_now().await;
                }
            }));
        }

        let mut gossipers = Vec::new();
        for g in 0..GOSSIPERS {
            let sync = sync.clone();
            let chain = chain.clone();
            gossipers.push(tokio::spawn(async move {
                let mut appended = 0u64;
                for round in 0..ROUNDS {
                    // A peer announcing a successor of what it last saw from us.
                    let seen = chain.read().await.latest().clone();
                    let block = Block::next(&seen, format!("gossiped {}-{}", g, round));
                    match sync.reconcile(vec![block]).await {
                        ReconcileOutcome::Appended => appended += 1,
                        ReconcileOutcome::AlreadyCurrent => {}
                        other => panic!("unexpected outcome {:?}", other),
                    }
                    tokio::task::yield_now().await;
                }
                appended
            }));
        }

        for miner in miners {
            miner.await.unwrap();
        }
        let mut appended = 0;
        for gossiper in gossipers {
            appended += gossiper.await.unwrap();
        }

        let chain = chain.read().await;
        assert!(is_valid_chain(chain.blocks()));
        assert_eq!(chain.len() as u64, 1 + (MINERS * ROUNDS) as u64 + appended);
        assert_eq!(api.blocks_mined(), (MINERS * ROUNDS) as u64);
        assert_eq!(sync.stats().blocks_appended, appended);
    })
    .await
    .expect("test_concurrent_writers_keep_chain_linked timed out");
}
