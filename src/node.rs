//! A Kademlia node: routing table, value store, and RPC engine composed together,
//! implementing the four primitive RPCs.
//!
//! Grounded in the reference's `KademliaNode(DatagramRPCProtocol)` composition —
//! one object owning both the wire protocol and the application-level handlers —
//! but the handler dispatch itself is the static `RequestHandler` impl below
//! rather than attribute-introspected methods.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::{NodeError, RpcError};
use crate::identifier::Identifier;
use crate::message::{Answer, CompactPeer, Procedure};
use crate::operations::LookupContext;
use crate::routing::{PeerRecord, RoutingTable};
use crate::rpc::{RequestHandler, RpcEngine};

/// The local value store. A plain in-memory map: no TTL, no expiry, no
/// persistence — those are explicitly out of scope.
type ValueStore = RwLock<HashMap<Identifier, Vec<u8>>>;

/// A running Kademlia node.
pub struct KademliaNode {
    id: Identifier,
    k: usize,
    alpha: usize,
    routing: Arc<RwLock<RoutingTable>>,
    store: Arc<ValueStore>,
    rpc: RpcEngine,
    _receive_loop: tokio::task::JoinHandle<()>,
}

impl KademliaNode {
    /// Bind a UDP socket and start the node per `config`.
    pub async fn start(config: NodeConfig) -> Result<Self, RpcError> {
        let id = config.identifier.unwrap_or_else(Identifier::random);
        let routing = Arc::new(RwLock::new(RoutingTable::new(id, config.k)));
        let store: Arc<ValueStore> = Arc::new(RwLock::new(HashMap::new()));

        let handler = Arc::new(NodeHandler {
            routing: Arc::clone(&routing),
            store: Arc::clone(&store),
        });

        let (rpc, receive_loop) = RpcEngine::bind(config.bind_addr, id, config.reply_timeout, handler).await?;
        info!(%id, addr = ?rpc.local_addr(), "node started");

        Ok(Self {
            id,
            k: config.k,
            alpha: config.alpha,
            routing,
            store,
            rpc,
            _receive_loop: receive_loop,
        })
    }

    #[must_use]
    pub const fn id(&self) -> Identifier {
        self.id
    }

    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    #[must_use]
    pub const fn alpha(&self) -> usize {
        self.alpha
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.rpc.local_addr()
    }

    /// Peers this node currently knows about, closest-first to `key` by the
    /// routing table's alternating-sweep order.
    pub async fn find_closest_peers(&self, key: &Identifier, excluding: Option<&Identifier>) -> Vec<PeerRecord> {
        self.routing.read().await.find_closest_peers(key, excluding)
    }

    /// Drop a peer from the routing table after a lookup observes it timing out.
    pub async fn forget(&self, id: &Identifier) {
        self.routing.write().await.forget_peer(id);
    }

    /// `ping` RPC: returns the peer's own identifier once observed.
    pub async fn ping(&self, addr: SocketAddr) -> Result<Identifier, NodeError> {
        match self.rpc.request(addr, Procedure::Ping).await {
            Ok((sender_id, Answer::Pong)) => Ok(sender_id),
            Ok((_, _)) => Err(NodeError::Rpc(RpcError::UnexpectedAnswer)),
            Err(err) => Err(NodeError::Rpc(err)),
        }
    }

    /// `store` RPC against a specific peer: ask it to hold `key -> value`.
    pub async fn store_at(&self, addr: SocketAddr, key: Identifier, value: Vec<u8>) -> Result<bool, NodeError> {
        match self.rpc.request(addr, Procedure::Store { key, value }).await {
            Ok((_, Answer::Stored(ok))) => Ok(ok),
            Ok((_, _)) => Err(NodeError::Rpc(RpcError::UnexpectedAnswer)),
            Err(err) => Err(NodeError::Rpc(err)),
        }
    }

    /// `find_node` RPC against a specific peer.
    pub async fn find_node_at(&self, addr: SocketAddr, key: Identifier) -> Result<(Identifier, Vec<CompactPeer>), NodeError> {
        match self.rpc.request(addr, Procedure::FindNode { key }).await {
            Ok((sender_id, Answer::Contacts(peers))) => Ok((sender_id, peers)),
            Ok((_, _)) => Err(NodeError::Rpc(RpcError::UnexpectedAnswer)),
            Err(err) => Err(NodeError::Rpc(err)),
        }
    }

    /// `find_value` RPC against a specific peer. Returns either the value or a
    /// contact list to continue the lookup with.
    pub async fn find_value_at(&self, addr: SocketAddr, key: Identifier) -> Result<(Identifier, FindValueOutcome), NodeError> {
        match self.rpc.request(addr, Procedure::FindValue { key }).await {
            Ok((sender_id, Answer::Found(value))) => Ok((sender_id, FindValueOutcome::Found(value))),
            Ok((sender_id, Answer::Contacts(peers))) => Ok((sender_id, FindValueOutcome::NotFound(peers))),
            Ok((_, _)) => Err(NodeError::Rpc(RpcError::UnexpectedAnswer)),
            Err(err) => Err(NodeError::Rpc(err)),
        }
    }

    /// Read a value out of the local store without touching the network.
    pub async fn get_local(&self, key: &Identifier) -> Option<Vec<u8>> {
        self.store.read().await.get(key).cloned()
    }
}

#[async_trait::async_trait]
impl LookupContext for KademliaNode {
    fn id(&self) -> Identifier {
        self.id()
    }

    fn k(&self) -> usize {
        self.k()
    }

    fn alpha(&self) -> usize {
        self.alpha()
    }

    async fn find_closest_peers(&self, key: &Identifier, excluding: Option<&Identifier>) -> Vec<PeerRecord> {
        self.find_closest_peers(key, excluding).await
    }

    async fn find_node_at(&self, addr: SocketAddr, key: Identifier) -> Result<(Identifier, Vec<CompactPeer>), NodeError> {
        self.find_node_at(addr, key).await
    }

    async fn find_value_at(&self, addr: SocketAddr, key: Identifier) -> Result<(Identifier, FindValueOutcome), NodeError> {
        self.find_value_at(addr, key).await
    }

    async fn store_at(&self, addr: SocketAddr, key: Identifier, value: Vec<u8>) -> Result<bool, NodeError> {
        self.store_at(addr, key, value).await
    }

    async fn forget(&self, id: &Identifier) {
        self.forget(id).await
    }

    async fn get_local(&self, key: &Identifier) -> Option<Vec<u8>> {
        self.get_local(key).await
    }
}

/// Either the `("found", value)` or `("notfound", contacts)` shape from
/// `find_value`, with the tag stripped away since the enum discriminant already
/// carries it.
#[derive(Debug, Clone)]
pub enum FindValueOutcome {
    Found(Vec<u8>),
    NotFound(Vec<CompactPeer>),
}

struct NodeHandler {
    routing: Arc<RwLock<RoutingTable>>,
    store: Arc<ValueStore>,
}

#[async_trait::async_trait]
impl RequestHandler for NodeHandler {
    async fn observe(&self, sender_id: Identifier, from: SocketAddr) {
        self.routing.write().await.update_peer(sender_id, from);
    }

    async fn handle(&self, sender_id: Identifier, _from: SocketAddr, procedure: Procedure) -> Answer {
        match procedure {
            Procedure::Ping => Answer::Pong,
            Procedure::Store { key, value } => {
                self.store.write().await.insert(key, value);
                Answer::Stored(true)
            }
            Procedure::FindNode { key } => {
                let peers = self
                    .routing
                    .read()
                    .await
                    .find_closest_peers(&key, Some(&sender_id))
                    .into_iter()
                    .map(CompactPeer::from)
                    .collect();
                Answer::Contacts(peers)
            }
            Procedure::FindValue { key } => {
                if let Some(value) = self.store.read().await.get(&key).cloned() {
                    debug!(%key, "serving find_value from local store");
                    Answer::Found(value)
                } else {
                    let peers = self
                        .routing
                        .read()
                        .await
                        .find_closest_peers(&key, Some(&sender_id))
                        .into_iter()
                        .map(CompactPeer::from)
                        .collect();
                    Answer::Contacts(peers)
                }
            }
        }
    }
}
