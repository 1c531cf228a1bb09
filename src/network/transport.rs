//! Record Transport
//!
//! Outbound half of a peer link: takes encoded fight records and hands them
//! to whatever carries them. Inbound records reach the engine through
//! [`SessionHandle::deliver`](crate::network::session::SessionHandle::deliver).

use thiserror::Error;
use tokio::sync::mpsc;

use crate::network::session::SessionHandle;

/// Failure to hand a record to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The other end is gone.
    #[error("transport closed")]
    Closed,
}

/// Sends encoded records to the peer. Must not block.
pub trait Transport: Send + Sync {
    /// Queue one record for delivery.
    fn send(&self, record: &[u8]) -> Result<(), TransportError>;
}

/// In-process link straight into another session's queue.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    peer: SessionHandle,
}

impl LoopbackTransport {
    /// Deliver to `peer`.
    pub fn new(peer: SessionHandle) -> Self {
        Self { peer }
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, record: &[u8]) -> Result<(), TransportError> {
        self.peer.deliver(record.to_vec()).map_err(|_| TransportError::Closed)
    }
}

/// Feeds a writer task over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    /// Wrap the writer's sender.
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, record: &[u8]) -> Result<(), TransportError> {
        self.tx.send(record.to_vec()).map_err(|_| TransportError::Closed)
    }
}
