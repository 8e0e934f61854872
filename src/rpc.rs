//! Datagram-based request/reply RPC engine.
//!
//! Grounded in the teacher's receive-loop pattern of spawning one background task
//! per socket that decodes each datagram and dispatches it, and in its
//! `DashMap`-backed shared state for anything touched from both that task and the
//! caller awaiting a reply. The pending-request table plays the role of the
//! reference's `outstanding_requests` dict; `tokio::time::timeout` plays the role
//! of its `call_later`-scheduled timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{MessageError, RpcError};
use crate::identifier::Identifier;
use crate::message::{Answer, Frame, Procedure};

/// Max UDP payload this engine will attempt to read in one `recv_from`.
const MAX_DATAGRAM: usize = 64 * 1024;

/// A reply as observed by the engine: the sender's id (for routing-table
/// bookkeeping) paired with the answer payload.
pub type ReplyEnvelope = (Identifier, Answer);

/// Handles one node's UDP socket: sending requests and replies, correlating
/// incoming replies to pending requests, and handing off incoming requests to a
/// caller-supplied handler.
pub struct RpcEngine {
    socket: Arc<UdpSocket>,
    local_id: Identifier,
    reply_timeout: Duration,
    pending: Arc<DashMap<Identifier, oneshot::Sender<ReplyEnvelope>>>,
}

/// What the receive loop does with a decoded incoming request: compute an answer
/// and who to route it to for housekeeping. Implemented by the node.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Called for every `Frame::Request` received, after the sender has already
    /// been recorded in the routing table. Returns the answer to send back.
    async fn handle(&self, sender_id: Identifier, from: SocketAddr, procedure: Procedure) -> Answer;

    /// Called for every frame received (request or reply) before anything else,
    /// so the routing table reflects every observed contact.
    async fn observe(&self, sender_id: Identifier, from: SocketAddr);
}

impl RpcEngine {
    /// Bind a UDP socket at `bind_addr` and return the engine plus the background
    /// receive loop's join handle. The caller is responsible for keeping the
    /// handle (or detaching it) for the node's lifetime.
    pub async fn bind(
        bind_addr: SocketAddr,
        local_id: Identifier,
        reply_timeout: Duration,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), RpcError> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let pending: Arc<DashMap<Identifier, oneshot::Sender<ReplyEnvelope>>> = Arc::new(DashMap::new());

        let engine = Self {
            socket: Arc::clone(&socket),
            local_id,
            reply_timeout,
            pending: Arc::clone(&pending),
        };

        let recv_socket = Arc::clone(&socket);
        let recv_pending = Arc::clone(&pending);
        let join = tokio::spawn(async move {
            receive_loop(recv_socket, recv_pending, handler, local_id).await;
        });

        Ok((engine, join))
    }

    #[must_use]
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send `procedure` to `addr` and await its reply, failing with
    /// [`RpcError::Timeout`] after `reply_timeout`.
    pub async fn request(&self, addr: SocketAddr, procedure: Procedure) -> Result<ReplyEnvelope, RpcError> {
        let message_id = Identifier::random();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(message_id, tx);

        let frame = Frame::Request {
            message_id,
            sender_id: self.local_id,
            procedure,
        };
        let bytes = frame.to_bytes()?;
        trace!(%addr, %message_id, "sending request");
        self.socket.send_to(&bytes, addr).await?;

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(RpcError::Timeout { addr, message_id }),
            Err(_) => {
                self.pending.remove(&message_id);
                warn!(%addr, %message_id, "request timed out");
                Err(RpcError::Timeout { addr, message_id })
            }
        }
    }

    /// Send `answer` back to `addr`, correlated by `message_id`.
    pub async fn reply(&self, addr: SocketAddr, message_id: Identifier, answer: Answer) -> Result<(), RpcError> {
        let frame = Frame::Reply {
            message_id,
            sender_id: self.local_id,
            answer,
        };
        let bytes = frame.to_bytes()?;
        self.socket.send_to(&bytes, addr).await?;
        Ok(())
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    pending: Arc<DashMap<Identifier, oneshot::Sender<ReplyEnvelope>>>,
    handler: Arc<dyn RequestHandler>,
    local_id: Identifier,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "udp recv_from failed, stopping receive loop");
                return;
            }
        };

        let frame = match Frame::from_bytes(&buf[..len]) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%from, %err, "dropping malformed datagram");
                continue;
            }
        };

        handler.observe(frame.sender_id(), from).await;

        match frame {
            Frame::Request {
                message_id,
                sender_id,
                procedure,
            } => {
                let answer = handler.handle(sender_id, from, procedure).await;
                let reply = Frame::Reply {
                    message_id,
                    sender_id: local_id,
                    answer,
                };
                if let Err(err) = send_reply(&socket, from, &reply).await {
                    warn!(%from, %message_id, %err, "failed to send reply");
                }
            }
            Frame::Reply {
                message_id,
                sender_id,
                answer,
            } => {
                if let Some((_, tx)) = pending.remove(&message_id) {
                    let _ = tx.send((sender_id, answer));
                } else {
                    debug!(%from, %message_id, "dropping reply for unknown or expired request");
                }
            }
        }
    }
}

async fn send_reply(socket: &UdpSocket, addr: SocketAddr, frame: &Frame) -> Result<(), MessageError> {
    let bytes = frame.to_bytes()?;
    let _ = socket.send_to(&bytes, addr).await;
    Ok(())
}
