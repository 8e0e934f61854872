//! Wire frames exchanged between nodes.
//!
//! The reference dispatches requests by introspecting decorated methods and
//! encodes replies with a self-describing object format. Both are replaced here
//! with an explicit tagged-variant grammar: [`Procedure`] enumerates the four
//! primitive RPCs with typed payloads, [`Answer`] enumerates the reply shapes, and
//! [`Frame`] is the outer envelope. `bincode` over `serde`-derived types gives a
//! schema-checked encoding where an unrecognized discriminator or truncated buffer
//! is a decode error, never a constructor call — grounded in the teacher's
//! `DhtMessage` variant/payload-struct split in `messages.rs`, with the encryption
//! layer it carries dropped entirely (out of scope here).

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::identifier::Identifier;
use crate::routing::PeerRecord;

/// A peer as carried over the wire: compact enough to round-trip through
/// `find_node`/`find_value` contact lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactPeer {
    pub id: Identifier,
    pub addr: SocketAddr,
}

impl From<PeerRecord> for CompactPeer {
    fn from((id, addr): PeerRecord) -> Self {
        Self { id, addr }
    }
}

impl From<CompactPeer> for PeerRecord {
    fn from(peer: CompactPeer) -> Self {
        (peer.id, peer.addr)
    }
}

/// The body of a request frame: one variant per primitive RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Procedure {
    Ping,
    Store { key: Identifier, value: Vec<u8> },
    FindNode { key: Identifier },
    FindValue { key: Identifier },
}

impl Procedure {
    /// Human-readable name, used only for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Store { .. } => "store",
            Self::FindNode { .. } => "find_node",
            Self::FindValue { .. } => "find_value",
        }
    }
}

/// The body of a reply frame: one variant per possible answer shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Answer {
    Pong,
    Stored(bool),
    Contacts(Vec<CompactPeer>),
    Found(Vec<u8>),
}

/// The outer envelope. Every frame carries the sender's own identifier so the
/// receiver can update its routing table before doing anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    Request {
        message_id: Identifier,
        sender_id: Identifier,
        procedure: Procedure,
    },
    Reply {
        message_id: Identifier,
        sender_id: Identifier,
        answer: Answer,
    },
}

impl Frame {
    /// Encode this frame into a single datagram payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    /// Decode a single datagram payload into a frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(frame)
    }

    /// The sender's identifier, present on every frame shape.
    #[must_use]
    pub const fn sender_id(&self) -> Identifier {
        match self {
            Self::Request { sender_id, .. } | Self::Reply { sender_id, .. } => *sender_id,
        }
    }

    /// The correlating message id, present on every frame shape.
    #[must_use]
    pub const fn message_id(&self) -> Identifier {
        match self {
            Self::Request { message_id, .. } | Self::Reply { message_id, .. } => *message_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000)
    }

    #[test]
    fn request_roundtrips() {
        let frame = Frame::Request {
            message_id: Identifier::random(),
            sender_id: Identifier::random(),
            procedure: Procedure::FindValue {
                key: Identifier::hash_key(b"hello"),
            },
        };
        let bytes = frame.to_bytes().unwrap();
        let decoded = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(frame.message_id(), decoded.message_id());
        assert_eq!(frame.sender_id(), decoded.sender_id());
        match decoded {
            Frame::Request {
                procedure: Procedure::FindValue { key },
                ..
            } => assert_eq!(key, Identifier::hash_key(b"hello")),
            _ => panic!("expected a FindValue request"),
        }
    }

    #[test]
    fn reply_with_contacts_roundtrips() {
        let peer = CompactPeer {
            id: Identifier::random(),
            addr: addr(),
        };
        let frame = Frame::Reply {
            message_id: Identifier::random(),
            sender_id: Identifier::random(),
            answer: Answer::Contacts(vec![peer]),
        };
        let bytes = frame.to_bytes().unwrap();
        let decoded = Frame::from_bytes(&bytes).unwrap();
        match decoded {
            Frame::Reply {
                answer: Answer::Contacts(peers),
                ..
            } => assert_eq!(peers[0], peer),
            _ => panic!("expected a Contacts reply"),
        }
    }

    #[test]
    fn decoding_garbage_is_an_error() {
        assert!(Frame::from_bytes(&[0xff; 4]).is_err());
    }

    #[test]
    fn store_and_found_roundtrip() {
        let frame = Frame::Request {
            message_id: Identifier::random(),
            sender_id: Identifier::random(),
            procedure: Procedure::Store {
                key: Identifier::hash_key(b"k"),
                value: b"v".to_vec(),
            },
        };
        let decoded = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        assert!(matches!(
            decoded,
            Frame::Request {
                procedure: Procedure::Store { .. },
                ..
            }
        ));

        let reply = Frame::Reply {
            message_id: Identifier::random(),
            sender_id: Identifier::random(),
            answer: Answer::Found(b"world".to_vec()),
        };
        let decoded = Frame::from_bytes(&reply.to_bytes().unwrap()).unwrap();
        match decoded {
            Frame::Reply {
                answer: Answer::Found(v),
                ..
            } => assert_eq!(v, b"world"),
            _ => panic!("expected a Found reply"),
        }
    }
}
