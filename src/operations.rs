//! Iterative lookup and the `put`/`get` procedures built on top of it.
//!
//! This module has no counterpart in the reference source — `find_node` and
//! `find_value` there are unimplemented stubs — so its algorithm is grounded
//! directly in the behavior pinned down by `tests/test_node.py`'s
//! `test_lookup_node` and `test_lookup_node_with_value` fixtures: sequential
//! probing within a round, `dead` peers excluded from the final result, and an
//! immediate return on the first `"found"` answer.
//!
//! `lookup_node` is generic over [`LookupContext`] rather than taking a concrete
//! `&KademliaNode` directly, so the dead-peer/multi-round/found-shortcut paths
//! can be driven by a deterministic in-memory double in tests instead of real
//! sockets and timeouts.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::error::NodeError;
use crate::identifier::Identifier;
use crate::message::CompactPeer;
use crate::node::{FindValueOutcome, KademliaNode};
use crate::routing::PeerRecord;

/// Per-round lookup parallelism, unless a node overrides it via `NodeConfig`.
pub const ALPHA: usize = crate::config::DEFAULT_ALPHA;

/// Result of a `find_node`-flavored lookup: the k closest live peers found.
pub type NodeLookupResult = Vec<PeerRecord>;

/// The operations a lookup round needs from its owning node: routing-table
/// reads/writes and the four primitive RPCs. Abstracted out so `lookup_node` can
/// be driven by a mock topology in tests without opening any sockets.
#[async_trait::async_trait]
pub trait LookupContext: Sync {
    fn id(&self) -> Identifier;
    fn k(&self) -> usize;
    fn alpha(&self) -> usize;
    async fn find_closest_peers(&self, key: &Identifier, excluding: Option<&Identifier>) -> Vec<PeerRecord>;
    async fn find_node_at(&self, addr: SocketAddr, key: Identifier) -> Result<(Identifier, Vec<CompactPeer>), NodeError>;
    async fn find_value_at(&self, addr: SocketAddr, key: Identifier) -> Result<(Identifier, FindValueOutcome), NodeError>;
    async fn store_at(&self, addr: SocketAddr, key: Identifier, value: Vec<u8>) -> Result<bool, NodeError>;
    async fn forget(&self, id: &Identifier);
    async fn get_local(&self, key: &Identifier) -> Option<Vec<u8>>;
}

/// Run the iterative lookup for `hashed_key`. When `want_value` is true, returns
/// as soon as any contacted peer answers with a stored value; otherwise it
/// converges on the k closest reachable peers.
pub async fn lookup_node<C: LookupContext>(
    node: &C,
    hashed_key: Identifier,
    want_value: bool,
) -> Result<LookupOutcome, NodeError> {
    let mut peers: Vec<PeerRecord> = node.find_closest_peers(&hashed_key, None).await;
    if peers.is_empty() {
        return Err(NodeError::NoPeersAvailable);
    }

    let mut contacted: HashSet<Identifier> = HashSet::new();
    let mut dead: HashSet<Identifier> = HashSet::new();
    let mut known: HashSet<Identifier> = peers.iter().map(|(id, _)| *id).collect();

    loop {
        let mut uncontacted: Vec<PeerRecord> = peers
            .iter()
            .filter(|(id, _)| !contacted.contains(id))
            .copied()
            .collect();
        if uncontacted.is_empty() {
            break;
        }

        uncontacted.sort_by_key(|(id, _)| id.distance(&hashed_key));
        let round: Vec<PeerRecord> = uncontacted.into_iter().take(node.alpha()).collect();

        for (peer_id, addr) in round {
            contacted.insert(peer_id);

            if want_value {
                match node.find_value_at(addr, hashed_key).await {
                    Ok((_, FindValueOutcome::Found(value))) => return Ok(LookupOutcome::Value(value)),
                    Ok((_, FindValueOutcome::NotFound(contacts))) => {
                        merge_contacts(node, &mut peers, &mut known, contacts).await;
                    }
                    Err(_) => {
                        node.forget(&peer_id).await;
                        dead.insert(peer_id);
                    }
                }
            } else {
                match node.find_node_at(addr, hashed_key).await {
                    Ok((_, contacts)) => {
                        merge_contacts(node, &mut peers, &mut known, contacts).await;
                    }
                    Err(_) => {
                        node.forget(&peer_id).await;
                        dead.insert(peer_id);
                    }
                }
            }
        }
    }

    if want_value {
        return Err(NodeError::NotFound);
    }

    let mut closest: Vec<PeerRecord> = peers.into_iter().filter(|(id, _)| !dead.contains(id)).collect();
    closest.sort_by_key(|(id, _)| id.distance(&hashed_key));
    closest.truncate(node.k());
    Ok(LookupOutcome::Peers(closest))
}

/// Merge a contact list from a reply into the lookup's candidate set, filtering
/// out the local node's own identifier and de-duplicating against what's already
/// known.
async fn merge_contacts<C: LookupContext>(
    node: &C,
    peers: &mut Vec<PeerRecord>,
    known: &mut HashSet<Identifier>,
    contacts: Vec<CompactPeer>,
) {
    for contact in contacts {
        if contact.id == node.id() {
            continue;
        }
        if known.insert(contact.id) {
            peers.push((contact.id, contact.addr));
        }
    }
}

/// What an iterative lookup converges on.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Value(Vec<u8>),
    Peers(NodeLookupResult),
}

/// Hash `raw_key`, locate its replicas, and store `value` on each of them in
/// parallel. Returns the number of peers that acknowledged the store.
pub async fn put(node: &KademliaNode, raw_key: &[u8], value: Vec<u8>) -> Result<usize, NodeError> {
    let hashed_key = Identifier::hash_key(raw_key);
    let outcome = lookup_node(node, hashed_key, false).await?;
    let LookupOutcome::Peers(peers) = outcome else {
        unreachable!("lookup_node(want_value=false) always returns Peers");
    };

    let stores = peers.into_iter().map(|(_, addr)| {
        let value = value.clone();
        async move { node.store_at(addr, hashed_key, value).await }
    });
    let results = futures::future::join_all(stores).await;
    Ok(results.into_iter().filter(|r| matches!(r, Ok(true))).count())
}

/// Hash `raw_key` and return its value, short-circuiting to the local store when
/// present and otherwise running an iterative value lookup.
pub async fn get(node: &KademliaNode, raw_key: &[u8]) -> Result<Vec<u8>, NodeError> {
    let hashed_key = Identifier::hash_key(raw_key);
    if let Some(value) = node.get_local(&hashed_key).await {
        return Ok(value);
    }

    match lookup_node(node, hashed_key, true).await? {
        LookupOutcome::Value(value) => Ok(value),
        // want_value=true makes lookup_node return either `Value` above or
        // `Err(NodeError::NotFound)` itself; this arm exists only because
        // LookupOutcome is shared with the find_node-flavored call, not because
        // a real lookup can produce it here.
        LookupOutcome::Peers(_) => unreachable!("lookup_node(want_value=true) never returns Peers"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    #[test]
    fn alpha_matches_default_config() {
        assert_eq!(ALPHA, 3);
    }

    fn id_from_u32(v: u32) -> Identifier {
        let mut bytes = [0u8; 20];
        bytes[16..].copy_from_slice(&v.to_be_bytes());
        Identifier::from_bytes(bytes)
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    /// A peer's scripted behavior when probed during a lookup.
    #[derive(Clone)]
    enum Script {
        /// Returns this contact list (possibly empty) and stays reachable.
        Contacts(Vec<CompactPeer>),
        /// Returns this value, for `find_value_at` probes.
        Value(Vec<u8>),
        /// Times out: both `find_node_at` and `find_value_at` return an error.
        Dead,
    }

    /// A fully deterministic, in-memory stand-in for [`KademliaNode`], wired with
    /// a fixed peer topology and recording every probed peer id, in order, so
    /// tests can assert exact call count and order.
    struct MockContext {
        self_id: Identifier,
        k: usize,
        alpha: usize,
        seeds: Vec<PeerRecord>,
        peers: HashMap<Identifier, Script>,
        addrs: HashMap<SocketAddr, Identifier>,
        calls: Mutex<Vec<Identifier>>,
    }

    impl MockContext {
        fn calls(&self) -> Vec<Identifier> {
            self.calls.lock().unwrap().clone()
        }

        fn peer_at(&self, addr: SocketAddr) -> (Identifier, Script) {
            let peer_id = *self.addrs.get(&addr).unwrap_or_else(|| panic!("no mock peer registered at {addr}"));
            (peer_id, self.peers[&peer_id].clone())
        }
    }

    #[async_trait::async_trait]
    impl LookupContext for MockContext {
        fn id(&self) -> Identifier {
            self.self_id
        }

        fn k(&self) -> usize {
            self.k
        }

        fn alpha(&self) -> usize {
            self.alpha
        }

        async fn find_closest_peers(&self, _key: &Identifier, _excluding: Option<&Identifier>) -> Vec<PeerRecord> {
            self.seeds.clone()
        }

        async fn find_node_at(&self, addr: SocketAddr, key: Identifier) -> Result<(Identifier, Vec<CompactPeer>), NodeError> {
            let (peer_id, script) = self.peer_at(addr);
            self.calls.lock().unwrap().push(peer_id);
            match script {
                Script::Dead => Err(NodeError::Rpc(crate::error::RpcError::Timeout { addr, message_id: key })),
                Script::Contacts(contacts) => Ok((peer_id, contacts)),
                Script::Value(_) => panic!("find_node_at called on a value-scripted mock peer"),
            }
        }

        async fn find_value_at(&self, addr: SocketAddr, key: Identifier) -> Result<(Identifier, FindValueOutcome), NodeError> {
            let (peer_id, script) = self.peer_at(addr);
            self.calls.lock().unwrap().push(peer_id);
            match script {
                Script::Dead => Err(NodeError::Rpc(crate::error::RpcError::Timeout { addr, message_id: key })),
                Script::Contacts(contacts) => Ok((peer_id, FindValueOutcome::NotFound(contacts))),
                Script::Value(value) => Ok((peer_id, FindValueOutcome::Found(value))),
            }
        }

        async fn store_at(&self, _addr: SocketAddr, _key: Identifier, _value: Vec<u8>) -> Result<bool, NodeError> {
            unreachable!("not exercised by lookup_node tests")
        }

        async fn forget(&self, _id: &Identifier) {}

        async fn get_local(&self, _key: &Identifier) -> Option<Vec<u8>> {
            None
        }
    }

    /// `key = 0` makes `distance(id, key) == id`, so sorting by distance to
    /// `key` is plain ascending order of the test ids below — no XOR arithmetic
    /// to hand-verify.
    fn zero_key() -> Identifier {
        Identifier::from_bytes([0u8; 20])
    }

    fn contact(v: u32) -> CompactPeer {
        CompactPeer {
            id: id_from_u32(v),
            addr: addr(v as u16),
        }
    }

    /// Multi-round lookup with one dead peer: seeds {10, 20, 30} (alpha = 3, k =
    /// 2). Round 1 probes all three in distance order: 10 discovers 40, 20 times
    /// out, 30 discovers nothing new. Round 2 probes 40, which discovers nothing
    /// new and ends the lookup. Expects exactly 4 calls in order [10, 20, 30,
    /// 40], 20 excluded from the final result as dead, and the k=2 closest of
    /// the remaining {10, 30, 40} returned.
    #[tokio::test]
    async fn lookup_node_excludes_dead_peers_across_multiple_rounds() {
        let self_id = id_from_u32(999);
        let seeds = vec![
            (id_from_u32(10), addr(10)),
            (id_from_u32(20), addr(20)),
            (id_from_u32(30), addr(30)),
        ];
        let mut peers = HashMap::new();
        peers.insert(id_from_u32(10), Script::Contacts(vec![contact(40)]));
        peers.insert(id_from_u32(20), Script::Dead);
        peers.insert(id_from_u32(30), Script::Contacts(vec![]));
        peers.insert(id_from_u32(40), Script::Contacts(vec![]));
        let addrs = [10u32, 20, 30, 40].iter().map(|&v| (addr(v as u16), id_from_u32(v))).collect();

        let ctx = MockContext {
            self_id,
            k: 2,
            alpha: 3,
            seeds,
            peers,
            addrs,
            calls: Mutex::new(Vec::new()),
        };

        let outcome = lookup_node(&ctx, zero_key(), false).await.unwrap();
        assert_eq!(
            ctx.calls(),
            vec![id_from_u32(10), id_from_u32(20), id_from_u32(30), id_from_u32(40)]
        );
        let LookupOutcome::Peers(result) = outcome else {
            panic!("expected Peers");
        };
        let got: Vec<Identifier> = result.into_iter().map(|(id, _)| id).collect();
        assert_eq!(got, vec![id_from_u32(10), id_from_u32(30)]);
    }

    /// Found-shortcut lookup: seeds {5, 15, 25} (alpha = 3), value lookup. 5 and
    /// 15 report not-found, 25 reports the value — the lookup must return
    /// immediately on that third call rather than continuing to a second round.
    #[tokio::test]
    async fn lookup_node_returns_as_soon_as_a_peer_has_the_value() {
        let self_id = id_from_u32(999);
        let seeds = vec![
            (id_from_u32(5), addr(5)),
            (id_from_u32(15), addr(15)),
            (id_from_u32(25), addr(25)),
        ];
        let mut peers = HashMap::new();
        peers.insert(id_from_u32(5), Script::Contacts(vec![]));
        peers.insert(id_from_u32(15), Script::Contacts(vec![]));
        peers.insert(id_from_u32(25), Script::Value(b"world".to_vec()));
        let addrs = [5u32, 15, 25].iter().map(|&v| (addr(v as u16), id_from_u32(v))).collect();

        let ctx = MockContext {
            self_id,
            k: 20,
            alpha: 3,
            seeds,
            peers,
            addrs,
            calls: Mutex::new(Vec::new()),
        };

        let outcome = lookup_node(&ctx, zero_key(), true).await.unwrap();
        assert_eq!(ctx.calls(), vec![id_from_u32(5), id_from_u32(15), id_from_u32(25)]);
        match outcome {
            LookupOutcome::Value(value) => assert_eq!(value, b"world"),
            LookupOutcome::Peers(_) => panic!("expected Value"),
        }
    }
}
