#![forbid(unsafe_code)]
//! GossipChain node: gossip listener, initial peers and the admin API

use clap::Parser;
use gossipchain::config::{load_config, DEFAULT_CONFIG_PATH};
use gossipchain::node::Node;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTTP listen address, `HOST:PORT` or `:PORT`
    #[arg(long)]
    api: Option<String>,
    /// P2P listen address, `HOST:PORT` or `:PORT`
    #[arg(long)]
    p2p: Option<String>,
    /// Comma separated initial peers, e.g. `ws://localhost:6001,ws://localhost:6002`
    #[arg(long)]
    peers: Option<String>,
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?.with_overrides(cli.api, cli.p2p, cli.peers.as_deref());
    let node = Arc::new(Node::init(config)?);
    node.start().await?;
    Ok(())
}
