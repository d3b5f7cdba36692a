//! # peerwire
//!
//! Peer-to-peer data channels over a pluggable message transport.
//!
//! A [`DataChannel`] lets applications send and receive arbitrary payloads
//! while it takes care of the plumbing underneath:
//!
//! - **Serialization**: MessagePack (binary), JSON text, or pass-through
//! - **Chunking**: oversized binary frames are split and reassembled
//! - **Backpressure**: rejected writes are buffered and retried in order
//! - **Lifecycle**: `initializing → open → closed`, driven by negotiation
//!
//! Establishing the transport is left to a [`Negotiator`](transport::Negotiator).
//! The [`transport::memory`] module provides an in-process one.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use peerwire::transport::{MemoryEndpoint, MemoryNegotiator};
//! use peerwire::{ChannelEvent, DataChannel, Payload, Serialization};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (a, b) = MemoryEndpoint::pair();
//!
//! let (sender, mut sender_events) = DataChannel::builder()
//!     .serialization(Serialization::Json)
//!     .connect(Arc::new(MemoryNegotiator::auto_open(a)));
//! let (_receiver, mut receiver_events) = DataChannel::builder()
//!     .serialization(Serialization::Json)
//!     .connect(Arc::new(MemoryNegotiator::auto_open(b)));
//!
//! assert!(matches!(sender_events.recv().await, Some(ChannelEvent::Open)));
//! sender.send(json!({"name": "foobar"}));
//!
//! let payload = receiver_events.next_data().await.unwrap();
//! assert_eq!(payload, Payload::from(json!({"name": "foobar"})));
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

mod backpressure;
mod channel;
mod payload;

pub use backpressure::{SendBuffer, DEFAULT_RETRY_DELAY};
pub use channel::{ChannelState, DataChannel, DataChannelBuilder};
pub use codec::Serialization;
pub use config::{Capabilities, ChannelConfig};
pub use error::{ChannelError, Result};
pub use events::{ChannelEvent, EventKind, EventStream};
pub use payload::Payload;
