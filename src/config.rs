//! Runtime configuration for a [`crate::node::KademliaNode`].

use std::net::SocketAddr;
use std::time::Duration;

use crate::identifier::Identifier;

/// Bucket capacity and lookup-result width, unless overridden.
pub const DEFAULT_K: usize = 20;

/// Per-round lookup parallelism, unless overridden.
pub const DEFAULT_ALPHA: usize = 3;

/// Per-RPC reply timeout, unless overridden.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Constructor arguments for a node. All fields are optional in spirit — use
/// [`NodeConfig::default`] and override only what a caller cares about, following
/// the teacher's `DiscoveryConfig`-style constructor-argument struct rather than a
/// process-global.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Bucket capacity and lookup-result width.
    pub k: usize,
    /// Per-round lookup parallelism.
    pub alpha: usize,
    /// Override the node's own identifier (primarily for tests). `None` draws a
    /// fresh random identifier at node construction.
    pub identifier: Option<Identifier>,
    /// Per-RPC reply timeout.
    pub reply_timeout: Duration,
    /// Local UDP address to bind.
    pub bind_addr: SocketAddr,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
            identifier: None,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            bind_addr: "127.0.0.1:0".parse().expect("static address parses"),
        }
    }
}
