//! Data channel handle and its driver task.
//!
//! [`DataChannelBuilder`] configures a channel and connects it through a
//! [`Negotiator`]. The returned [`DataChannel`] is a cheap handle; all
//! pipeline state lives in a driver task:
//!
//! ```text
//! DataChannel::send ─┐                      ┌─► Serialization ─► Chunker ─► SendBuffer ─► Transport
//! DataChannel::close ┼─► mpsc ─► Driver ────┤
//! Negotiator ready ──┤                      └─◄ Reassembler ◄─ Serialization ◄─ TransportEvent
//! Retry deadline ────┤
//! Blob reads ────────┘
//! ```
//!
//! The driver is the only place that touches the send buffer and the
//! reassembler, so neither needs a lock. Lifecycle state is mirrored in an
//! atomic for the handle's accessors.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use peerwire::transport::{MemoryEndpoint, MemoryNegotiator};
//! use peerwire::{ChannelEvent, DataChannel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (local, remote) = MemoryEndpoint::pair();
//! let (alice, mut alice_events) =
//!     DataChannel::builder().connect(Arc::new(MemoryNegotiator::auto_open(local)));
//! let (_bob, mut bob_events) =
//!     DataChannel::builder().connect(Arc::new(MemoryNegotiator::auto_open(remote)));
//!
//! assert!(matches!(alice_events.recv().await, Some(ChannelEvent::Open)));
//! alice.send("hello");
//!
//! let payload = bob_events.next_data().await.unwrap();
//! assert_eq!(payload.as_text(), Some("hello"));
//! # }
//! ```

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::backpressure::SendBuffer;
use crate::codec::{Encoded, RawCodec, Serialization};
use crate::config::{Capabilities, ChannelConfig};
use crate::error::{ChannelError, Result};
use crate::events::{ChannelEvent, EventHub, EventKind, EventStream};
use crate::payload::Payload;
use crate::protocol::{Blob, ChunkFrame, Chunker, Message, Reassembler};
use crate::transport::{Negotiator, Transport, TransportEvent, TransportHandle};

/// Lifecycle state of a data channel.
///
/// `Initializing → Open → Closed`, or `Initializing → Closed`. A closed
/// channel never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    /// Waiting for the transport.
    Initializing = 0,
    /// Sends are accepted.
    Open = 1,
    /// Terminal.
    Closed = 2,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Initializing,
            1 => ChannelState::Open,
            _ => ChannelState::Closed,
        }
    }

    /// State name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Initializing => "initializing",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between handles and the driver.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    /// Frames waiting in the send buffer.
    buffered: AtomicUsize,
    events: EventHub,
    config: ChannelConfig,
}

impl Shared {
    #[inline]
    fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `Closed`, returning the previous state.
    #[inline]
    fn mark_closed(&self) -> ChannelState {
        ChannelState::from_u8(
            self.state
                .swap(ChannelState::Closed as u8, Ordering::AcqRel),
        )
    }

    /// Move `Initializing → Open`. Returns false from any other state.
    #[inline]
    fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                ChannelState::Initializing as u8,
                ChannelState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn emit_error(&self, error: ChannelError) {
        tracing::debug!(connection_id = %self.config.connection_id, "Channel error: {}", error);
        self.events.emit(ChannelEvent::Error(Arc::new(error)));
    }
}

/// Requests from handles to the driver.
#[derive(Debug)]
enum Command {
    Send {
        payload: Payload,
        chunked: bool,
        /// State when the handle accepted the send.
        accepted_in: ChannelState,
    },
    Close,
}

/// Builder for configuring and connecting a data channel.
///
/// Use the fluent API to adjust the configuration, then call `connect()`.
#[derive(Debug, Default)]
pub struct DataChannelBuilder {
    config: ChannelConfig,
    label: Option<String>,
}

impl DataChannelBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the serialization mode.
    ///
    /// Default: binary
    pub fn serialization(mut self, serialization: Serialization) -> Self {
        self.config.serialization = serialization;
        self
    }

    /// Ask for a reliable transport.
    ///
    /// Default: false
    pub fn reliable(mut self, reliable: bool) -> Self {
        self.config.reliable = reliable;
        self
    }

    /// Set the label. Defaults to the connection id.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach opaque metadata.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.config.metadata = Some(metadata);
        self
    }

    /// Set the remote peer id.
    pub fn peer(mut self, peer: impl Into<String>) -> Self {
        self.config.peer = Some(peer.into());
        self
    }

    /// Use a specific connection id instead of a generated one.
    pub fn connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.config.connection_id = connection_id.into();
        self
    }

    /// Set platform capabilities.
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Set the chunk size for manual chunking.
    ///
    /// Default: 16300 bytes
    pub fn chunk_mtu(mut self, mtu: usize) -> Self {
        self.config.chunk_mtu = mtu;
        self
    }

    /// Set the delay before retrying a rejected write.
    ///
    /// Default: 100ms
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Bound the number of incomplete inbound chunked messages.
    ///
    /// Default: 1024. `None` keeps them for the connection's lifetime.
    pub fn max_pending_streams(mut self, max: Option<usize>) -> Self {
        self.config.max_pending_streams = max;
        self
    }

    /// Cap the chunk count an inbound chunked message may declare.
    ///
    /// Default: 65536. Larger declarations are reported as malformed.
    pub fn max_chunks_per_stream(mut self, max: Option<u32>) -> Self {
        self.config.max_chunks_per_stream = max;
        self
    }

    /// Finish configuration without connecting.
    pub fn build_config(self) -> ChannelConfig {
        let mut config = self.config;
        config.label = self.label.unwrap_or_else(|| config.connection_id.clone());
        config
    }

    /// Create the channel and start negotiation.
    ///
    /// Must be called within a Tokio runtime.
    pub fn connect(self, negotiator: Arc<dyn Negotiator>) -> (DataChannel, EventStream) {
        DataChannel::connect(self.build_config(), negotiator)
    }
}

/// Handle to a data channel.
///
/// Cheap to clone. Dropping every handle closes the channel.
#[derive(Clone)]
pub struct DataChannel {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl DataChannel {
    /// Create a new channel builder.
    pub fn builder() -> DataChannelBuilder {
        DataChannelBuilder::new()
    }

    /// Create a channel from a finished configuration and start negotiation.
    ///
    /// Returns the channel and a subscription to all of its events, created
    /// before anything can be emitted. Must be called within a Tokio runtime.
    pub fn connect(
        config: ChannelConfig,
        negotiator: Arc<dyn Negotiator>,
    ) -> (DataChannel, EventStream) {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(ChannelState::Initializing as u8),
            buffered: AtomicUsize::new(0),
            events: EventHub::new(),
            config,
        });
        let events = shared.events.subscribe();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        tracing::debug!(
            connection_id = %shared.config.connection_id,
            label = %shared.config.label,
            serialization = %shared.config.serialization,
            reliable = shared.config.reliable,
            "Data channel created"
        );

        negotiator.start(&shared.config, ready_tx);

        let driver = Driver::new(shared.clone(), negotiator);
        tokio::spawn(driver.run(commands_rx, ready_rx));

        let channel = DataChannel {
            shared,
            commands: commands_tx,
        };
        (channel, events)
    }

    /// Send a payload.
    ///
    /// Never fails synchronously. Problems (channel not open, payload not
    /// representable) arrive as `error` events.
    pub fn send(&self, payload: impl Into<Payload>) {
        self.command(Command::Send {
            payload: payload.into(),
            chunked: false,
            accepted_in: self.shared.state(),
        });
    }

    /// Send a payload that is already a chunk of a larger message.
    ///
    /// The payload is serialized but never split again.
    pub fn send_as_chunk(&self, payload: impl Into<Payload>) {
        self.command(Command::Send {
            payload: payload.into(),
            chunked: true,
            accepted_in: self.shared.state(),
        });
    }

    /// Serialize a value and send it as a structured payload.
    pub fn send_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        self.send(Payload::json(value)?);
        Ok(())
    }

    /// Close the channel. Safe to call repeatedly or before the channel opened.
    pub fn close(&self) {
        let previous = self.shared.mark_closed();
        if previous != ChannelState::Closed {
            tracing::debug!(
                connection_id = %self.shared.config.connection_id,
                from = %previous,
                "Closing data channel"
            );
            let _ = self.commands.send(Command::Close);
        }
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            // driver already finished
            self.shared
                .emit_error(ChannelError::NotOpen(self.shared.state()));
        }
    }

    /// Check if sends are currently accepted.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.shared.state() == ChannelState::Open
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Number of frames waiting for the transport.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }

    /// Connection id.
    pub fn connection_id(&self) -> &str {
        &self.shared.config.connection_id
    }

    /// Label.
    pub fn label(&self) -> &str {
        &self.shared.config.label
    }

    /// Serialization mode.
    pub fn serialization(&self) -> Serialization {
        self.shared.config.serialization
    }

    /// Whether a reliable transport was requested.
    pub fn reliable(&self) -> bool {
        self.shared.config.reliable
    }

    /// Application metadata.
    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.shared.config.metadata.as_ref()
    }

    /// Remote peer id.
    pub fn peer(&self) -> Option<&str> {
        self.shared.config.peer.as_deref()
    }

    /// Full configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Subscribe to every event from now on.
    pub fn subscribe(&self) -> EventStream {
        self.shared.events.subscribe()
    }

    /// Subscribe to the given event kinds from now on.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventStream {
        self.shared.events.subscribe_to(kinds)
    }
}

impl fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("connection_id", &self.shared.config.connection_id)
            .field("label", &self.shared.config.label)
            .field("state", &self.shared.state())
            .field("buffer_size", &self.buffer_size())
            .finish()
    }
}

/// Owner of all pipeline state for one channel.
struct Driver {
    shared: Arc<Shared>,
    negotiator: Arc<dyn Negotiator>,
    transport: Option<Arc<dyn Transport>>,
    chunker: Chunker,
    reassembler: Reassembler,
    buffer: SendBuffer,
    /// Pending blob reads.
    blobs: JoinSet<io::Result<Bytes>>,
    finished: bool,
}

impl Driver {
    fn new(shared: Arc<Shared>, negotiator: Arc<dyn Negotiator>) -> Self {
        let config = &shared.config;
        let chunker = Chunker::new(config.chunk_mtu);
        let reassembler = Reassembler::with_max_pending(config.max_pending_streams)
            .with_max_chunks(config.max_chunks_per_stream);
        let buffer = SendBuffer::new(config.retry_delay);

        Self {
            shared,
            negotiator,
            transport: None,
            chunker,
            reassembler,
            buffer,
            blobs: JoinSet::new(),
            finished: false,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        ready: oneshot::Receiver<TransportHandle>,
    ) {
        let mut ready = Some(ready);
        let mut events: Option<mpsc::UnboundedReceiver<TransportEvent>> = None;

        while !self.finished {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Send { payload, chunked, accepted_in }) => {
                        self.on_send(payload, chunked, accepted_in)
                    }
                    Some(Command::Close) | None => self.finish(),
                },
                handle = recv_ready(&mut ready) => match handle {
                    Some(handle) => {
                        self.transport = Some(handle.transport);
                        events = Some(handle.events);
                    }
                    None => {
                        tracing::error!(
                            connection_id = %self.shared.config.connection_id,
                            "Negotiation ended without a transport"
                        );
                        self.shared.emit_error(ChannelError::Negotiation(
                            "negotiator dropped the channel before a transport was ready"
                                .to_string(),
                        ));
                        self.finish();
                    }
                },
                event = next_event(&mut events) => self.on_transport_event(event),
                _ = sleep_until(self.buffer.retry_deadline()) => self.on_retry(),
                Some(read) = self.blobs.join_next(), if !self.blobs.is_empty() => {
                    self.on_blob_read(read)
                }
            }
        }

        // sends that raced with closing
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let Command::Send { .. } = command {
                self.shared
                    .emit_error(ChannelError::NotOpen(ChannelState::Closed));
            }
        }
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Open) => {
                if self.shared.mark_open() {
                    tracing::debug!(
                        connection_id = %self.shared.config.connection_id,
                        "Data channel open"
                    );
                    self.shared.events.emit(ChannelEvent::Open);
                }
            }
            Some(TransportEvent::Message(message)) => {
                if self.shared.state() == ChannelState::Open {
                    self.on_message(message);
                } else {
                    tracing::warn!(
                        connection_id = %self.shared.config.connection_id,
                        kind = message.kind(),
                        state = %self.shared.state(),
                        "Dropping message received while not open"
                    );
                }
            }
            Some(TransportEvent::Error(reason)) => {
                self.shared.emit_error(ChannelError::Transport(reason));
            }
            Some(TransportEvent::Closed) | None => self.finish(),
        }
    }

    /// Sends accepted while open are written even if a `close()` is already
    /// queued behind them.
    fn on_send(&mut self, payload: Payload, chunked: bool, accepted_in: ChannelState) {
        let transport = match (&self.transport, accepted_in) {
            (Some(transport), ChannelState::Open) => transport.clone(),
            _ => {
                self.shared.emit_error(ChannelError::NotOpen(accepted_in));
                return;
            }
        };

        let serialization = self.shared.config.serialization;
        let manual = self.shared.config.capabilities.requires_manual_chunking;
        let encoded = match serialization.encode(&payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.shared.emit_error(e);
                return;
            }
        };

        match encoded {
            Encoded::Message(message) => {
                self.buffer.buffered_send(transport.as_ref(), message);
            }
            Encoded::Packed(bytes) => {
                if !chunked && manual && self.chunker.needs_chunking(bytes.len()) {
                    self.send_chunks(transport.as_ref(), &bytes);
                } else {
                    let message = self.to_message(bytes);
                    self.buffer.buffered_send(transport.as_ref(), message);
                }
            }
        }

        self.sync_buffered();
    }

    fn send_chunks(&mut self, transport: &dyn Transport, bytes: &[u8]) {
        let chunks = match self.chunker.split(bytes) {
            Ok(chunks) => chunks,
            Err(e) => {
                self.shared.emit_error(e);
                return;
            }
        };

        tracing::debug!(
            size = bytes.len(),
            chunks = chunks.len(),
            stream_id = chunks.first().map(|c| c.stream_id),
            "Splitting oversized message"
        );

        for chunk in chunks {
            match chunk.encode() {
                Ok(frame) => {
                    let message = self.to_message(frame);
                    self.buffer.buffered_send(transport, message);
                }
                Err(e) => {
                    self.shared.emit_error(e);
                    return;
                }
            }
        }
    }

    /// Transport representation of a binary frame.
    fn to_message(&self, bytes: Bytes) -> Message {
        let caps = &self.shared.config.capabilities;
        if !caps.supports_binary {
            Message::Text(RawCodec::to_binary_string(&bytes))
        } else if caps.supports_binary_blob {
            Message::Blob(Blob::from_bytes(bytes))
        } else {
            Message::Binary(bytes)
        }
    }

    fn on_message(&mut self, message: Message) {
        let serialization = self.shared.config.serialization;
        match message {
            Message::Blob(blob) => match blob.try_into_bytes() {
                Ok(bytes) => self.on_bytes(bytes),
                Err(blob) => {
                    self.blobs.spawn(blob.read());
                }
            },
            Message::Binary(bytes) => self.on_bytes(bytes),
            Message::Text(text) if serialization.is_binary() => {
                match RawCodec::from_binary_string(&text) {
                    Ok(bytes) => self.on_bytes(bytes),
                    Err(e) => self.shared.emit_error(e),
                }
            }
            Message::Text(text) => self.deliver(serialization.decode_text(text)),
        }
    }

    fn on_blob_read(&mut self, read: std::result::Result<io::Result<Bytes>, JoinError>) {
        if self.shared.state() != ChannelState::Open {
            return;
        }
        match read {
            Ok(Ok(bytes)) => self.on_bytes(bytes),
            Ok(Err(e)) => self.shared.emit_error(ChannelError::Io(e)),
            Err(e) => self.shared.emit_error(ChannelError::Io(io::Error::other(e))),
        }
    }

    fn on_bytes(&mut self, bytes: Bytes) {
        let serialization = self.shared.config.serialization;
        if !serialization.is_binary() {
            self.deliver(serialization.decode_bytes(bytes));
            return;
        }

        match ChunkFrame::detect(&bytes) {
            None => self.deliver(serialization.decode_bytes(bytes)),
            Some(Ok(chunk)) => match self.reassembler.push(chunk) {
                Ok(Some(message)) => self.deliver(serialization.decode_bytes(message)),
                Ok(None) => {}
                Err(e) => self.shared.emit_error(e),
            },
            Some(Err(e)) => self.shared.emit_error(e),
        }
    }

    fn deliver(&self, decoded: Result<Payload>) {
        match decoded {
            Ok(payload) => {
                self.shared.events.emit(ChannelEvent::Data(payload));
            }
            Err(e) => self.shared.emit_error(e),
        }
    }

    fn on_retry(&mut self) {
        match (&self.transport, self.shared.state()) {
            (Some(transport), ChannelState::Open) => {
                let transport = transport.clone();
                self.buffer.try_buffer(transport.as_ref());
            }
            _ => self.buffer.clear(),
        }
        self.sync_buffered();
    }

    fn sync_buffered(&self) {
        self.shared
            .buffered
            .store(self.buffer.len(), Ordering::Release);
    }

    /// Enter `Closed`, release negotiation resources and emit `close`. Runs once.
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let previous = self.shared.mark_closed();
        let abandoned = self.buffer.len();
        self.buffer.clear();
        self.reassembler.clear();
        self.blobs.abort_all();
        self.sync_buffered();

        let connection_id = &self.shared.config.connection_id;
        self.negotiator.cleanup(connection_id);

        tracing::debug!(
            connection_id = %connection_id,
            from = %previous,
            abandoned,
            "Data channel closed"
        );
        self.shared.events.emit(ChannelEvent::Close);
    }
}

/// Resolves once with the negotiated transport, then never again.
async fn recv_ready(
    ready: &mut Option<oneshot::Receiver<TransportHandle>>,
) -> Option<TransportHandle> {
    match ready.as_mut() {
        Some(rx) => {
            let result = rx.await.ok();
            *ready = None;
            result
        }
        None => std::future::pending().await,
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryEndpoint, MemoryNegotiator};

    #[test]
    fn test_state_round_trip() {
        for state in [
            ChannelState::Initializing,
            ChannelState::Open,
            ChannelState::Closed,
        ] {
            assert_eq!(ChannelState::from_u8(state as u8), state);
        }
        assert_eq!(ChannelState::Open.to_string(), "open");
    }

    #[test]
    fn test_builder_configuration() {
        let config = DataChannel::builder()
            .serialization(Serialization::Json)
            .reliable(true)
            .label("chat")
            .peer("bob")
            .connection_id("dc_fixed")
            .chunk_mtu(1000)
            .retry_delay(Duration::from_millis(5))
            .max_pending_streams(None)
            .build_config();

        assert_eq!(config.serialization, Serialization::Json);
        assert!(config.reliable);
        assert_eq!(config.label, "chat");
        assert_eq!(config.peer.as_deref(), Some("bob"));
        assert_eq!(config.connection_id, "dc_fixed");
        assert_eq!(config.chunk_mtu, 1000);
        assert_eq!(config.retry_delay, Duration::from_millis(5));
        assert_eq!(config.max_pending_streams, None);
    }

    #[test]
    fn test_label_follows_connection_id() {
        let config = DataChannel::builder().connection_id("dc_abc").build_config();
        assert_eq!(config.label, "dc_abc");
    }

    #[tokio::test]
    async fn test_initial_state() {
        let endpoint = MemoryEndpoint::detached();
        let (channel, _events) =
            DataChannel::builder().connect(Arc::new(MemoryNegotiator::new(endpoint)));

        assert_eq!(channel.state(), ChannelState::Initializing);
        assert!(!channel.is_open());
        assert_eq!(channel.buffer_size(), 0);
    }

    #[tokio::test]
    async fn test_open_then_close() {
        let endpoint = MemoryEndpoint::detached();
        let (channel, mut events) =
            DataChannel::builder().connect(Arc::new(MemoryNegotiator::auto_open(endpoint)));

        assert!(matches!(events.recv().await, Some(ChannelEvent::Open)));
        assert!(channel.is_open());

        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(matches!(events.recv().await, Some(ChannelEvent::Close)));
    }

    #[tokio::test]
    async fn test_dropping_handles_closes() {
        let endpoint = MemoryEndpoint::detached();
        let negotiator = Arc::new(MemoryNegotiator::auto_open(endpoint));
        let (channel, mut events) = DataChannel::builder().connect(negotiator.clone());

        assert!(matches!(events.recv().await, Some(ChannelEvent::Open)));
        drop(channel);

        assert!(matches!(events.recv().await, Some(ChannelEvent::Close)));
        assert_eq!(negotiator.cleanup_count(), 1);
    }

    #[tokio::test]
    async fn test_negotiation_failure_closes() {
        let (channel, mut events) =
            DataChannel::builder().connect(Arc::new(MemoryNegotiator::unavailable()));

        match events.recv().await {
            Some(ChannelEvent::Error(e)) => {
                assert!(matches!(*e, ChannelError::Negotiation(_)))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(events.recv().await, Some(ChannelEvent::Close)));
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_send_after_close_reports_not_open() {
        let endpoint = MemoryEndpoint::detached();
        let (channel, mut events) =
            DataChannel::builder().connect(Arc::new(MemoryNegotiator::auto_open(endpoint)));

        channel.close();
        events.wait_for(EventKind::Close).await.unwrap();

        channel.send("late");
        match events.recv().await {
            Some(ChannelEvent::Error(e)) => {
                assert!(matches!(*e, ChannelError::NotOpen(ChannelState::Closed)))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
