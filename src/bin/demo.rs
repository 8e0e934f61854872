//! Interactive demo harness: start a local node, optionally bootstrap against
//! peers, and drive `put`/`get` from the command line.
//!
//! Grounded in the reference's `local_network.py`/`__main__.py` "start a node,
//! ping a bootstrap list, then accept interactive commands" shape, with the CLI
//! surface itself (`clap::Parser`/`Subcommand`, `tracing_subscriber` init gated by
//! a verbosity flag) grounded in `wraith-cli`'s `main.rs`.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use kademlia_node::config::NodeConfig;
use kademlia_node::node::KademliaNode;
use kademlia_node::operations::{get, put};
use tracing::info;

#[derive(Parser)]
#[command(name = "kademlia-node-demo", about = "Run and probe a local Kademlia node")]
struct Cli {
    /// Local address to bind the node's UDP socket to.
    #[arg(long, default_value = "127.0.0.1:0")]
    bind: SocketAddr,

    /// Known peer addresses to ping on startup.
    #[arg(long = "bootstrap")]
    bootstrap_peers: Vec<SocketAddr>,

    /// Enable debug-level logging.
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a value under a key and exit.
    Put { key: String, value: String },
    /// Look up a key's value and print it.
    Get { key: String },
    /// Start the node and idle, logging routing-table activity.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!("kademlia_node={log_level}")))
        .init();

    let config = NodeConfig {
        bind_addr: cli.bind,
        ..NodeConfig::default()
    };
    let node = KademliaNode::start(config).await?;
    info!(id = %node.id(), addr = ?node.local_addr()?, "node listening");

    for peer in &cli.bootstrap_peers {
        match node.ping(*peer).await {
            Ok(peer_id) => info!(%peer_id, %peer, "bootstrap peer reachable"),
            Err(err) => tracing::warn!(%peer, %err, "bootstrap peer unreachable"),
        }
    }

    match cli.command {
        Command::Put { key, value } => {
            let acks = put(&node, key.as_bytes(), value.into_bytes()).await?;
            println!("stored on {acks} peer(s)");
        }
        Command::Get { key } => {
            let value = get(&node, key.as_bytes()).await?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Command::Serve => {
            info!("serving forever, ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}
