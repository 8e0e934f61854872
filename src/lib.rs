//! A Kademlia distributed hash table node.
//!
//! Four pieces compose into a running node: [`identifier`] (160-bit identifiers
//! and the XOR metric), [`routing`] (the 160-bucket routing table), [`rpc`] (the
//! datagram request/reply engine), and [`node`]/[`operations`] (the primitive RPC
//! handlers and the iterative lookup that `put`/`get` are built from).
//!
//! # Example
//!
//! ```no_run
//! use kademlia_node::config::NodeConfig;
//! use kademlia_node::node::KademliaNode;
//! use kademlia_node::operations::{get, put};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let node = KademliaNode::start(NodeConfig::default()).await?;
//! put(&node, b"hello", b"world".to_vec()).await?;
//! let value = get(&node, b"hello").await?;
//! assert_eq!(value, b"world");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identifier;
pub mod message;
pub mod node;
pub mod operations;
pub mod routing;
pub mod rpc;
