//! Error taxonomy for the node's public operations.
//!
//! Each module that can fail gets its own `thiserror`-derived enum, scoped to the
//! failures it can actually produce, rather than one crate-wide catch-all.

use std::net::SocketAddr;

use thiserror::Error;

use crate::identifier::{Identifier, IdentifierError};

/// Errors raised while decoding or encoding a wire frame.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode frame: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("malformed identifier on the wire: {0}")]
    Identifier(#[from] IdentifierError),
}

/// Errors raised by the RPC engine.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request to {addr} timed out waiting for message {message_id}")]
    Timeout {
        addr: SocketAddr,
        message_id: Identifier,
    },
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("received a reply answer shape that does not match the request")]
    UnexpectedAnswer,
}

/// Errors raised by the node's composed operations (`lookup_node`, `put`, `get`).
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("no peers available to start a lookup")]
    NoPeersAvailable,
    #[error("value not found after exhausting all reachable peers")]
    NotFound,
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
