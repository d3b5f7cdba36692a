//! Transport module - the seams to negotiation and the message transport.
//!
//! A [`Negotiator`] establishes the underlying connection and hands back a
//! [`TransportHandle`] once the transport exists. The handle pairs the
//! write side ([`Transport`]) with a stream of [`TransportEvent`]s.
//!
//! [`memory`] provides an in-process implementation of both.

pub mod memory;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::ChannelConfig;
use crate::protocol::Message;

pub use memory::{MemoryEndpoint, MemoryNegotiator, MemoryTransport};

/// Reasons a transport write can be rejected.
///
/// All of them are treated as transient by the send buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Outgoing buffer is full.
    #[error("transport buffer full")]
    Full,

    /// Transport is not ready for writes yet.
    #[error("transport not ready")]
    NotReady,

    /// Transport has been closed.
    #[error("transport closed")]
    Closed,

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Write side of an established message transport.
pub trait Transport: Send + Sync {
    /// Hand one message to the transport.
    fn send(&self, message: &Message) -> Result<(), TransportError>;
}

/// Events raised by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// The transport is ready for traffic.
    Open,
    /// A message arrived from the remote side.
    Message(Message),
    /// The transport reported an error.
    Error(String),
    /// The transport closed.
    Closed,
}

/// A transport together with its event stream.
pub struct TransportHandle {
    /// Write side, shared with the negotiator if it needs it.
    pub transport: Arc<dyn Transport>,
    /// Events for this transport. Dropping the sender counts as `Closed`.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportHandle {
    /// Create a new handle.
    pub fn new(
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { transport, events }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

/// Signaling component that creates transports for channels.
pub trait Negotiator: Send + Sync {
    /// Begin negotiating a transport for `config`.
    ///
    /// Called once while the channel is constructed. Resolve `ready` when the
    /// transport exists; dropping it unresolved fails the channel.
    fn start(&self, config: &ChannelConfig, ready: oneshot::Sender<TransportHandle>);

    /// Release negotiation resources for a closed channel.
    fn cleanup(&self, connection_id: &str);
}
