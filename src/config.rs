//! Channel configuration.
//!
//! [`ChannelConfig`] carries everything fixed at construction time. It is
//! usually filled in through [`DataChannelBuilder`](crate::DataChannelBuilder).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backpressure::DEFAULT_RETRY_DELAY;
use crate::codec::Serialization;
use crate::protocol::{
    DEFAULT_CHUNK_MTU, DEFAULT_MAX_CHUNKS_PER_STREAM, DEFAULT_MAX_PENDING_STREAMS,
};

/// Prefix of generated connection ids.
pub const CONNECTION_ID_PREFIX: &str = "dc_";

/// Platform capabilities relevant to the message pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The transport cannot carry large messages, so oversized binary frames
    /// are split by the channel.
    pub requires_manual_chunking: bool,
    /// Binary frames are handed over as blobs instead of byte buffers.
    pub supports_binary_blob: bool,
    /// The transport carries binary frames at all. When false, binary frames
    /// travel as binary strings.
    pub supports_binary: bool,
}

impl Capabilities {
    /// Set `requires_manual_chunking`.
    pub fn with_manual_chunking(mut self, enabled: bool) -> Self {
        self.requires_manual_chunking = enabled;
        self
    }

    /// Set `supports_binary_blob`.
    pub fn with_binary_blob(mut self, enabled: bool) -> Self {
        self.supports_binary_blob = enabled;
        self
    }

    /// Set `supports_binary`.
    pub fn with_binary(mut self, enabled: bool) -> Self {
        self.supports_binary = enabled;
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            requires_manual_chunking: false,
            supports_binary_blob: false,
            supports_binary: true,
        }
    }
}

/// Configuration for a data channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Unique id of this connection.
    pub connection_id: String,
    /// Application label. Defaults to the connection id.
    pub label: String,
    /// Payload serialization mode.
    pub serialization: Serialization,
    /// Ask the negotiator for a reliable transport.
    pub reliable: bool,
    /// Opaque application metadata.
    pub metadata: Option<serde_json::Value>,
    /// Remote peer id.
    pub peer: Option<String>,
    /// Platform capabilities.
    pub capabilities: Capabilities,
    /// Chunk payload size for manual chunking.
    pub chunk_mtu: usize,
    /// Delay before retrying a rejected write.
    pub retry_delay: Duration,
    /// Bound on incomplete inbound chunked messages (`None` = unbounded).
    pub max_pending_streams: Option<usize>,
    /// Cap on the chunk count one inbound stream may declare (`None` = unbounded).
    pub max_chunks_per_stream: Option<u32>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        let connection_id = generate_connection_id();
        Self {
            label: connection_id.clone(),
            connection_id,
            serialization: Serialization::default(),
            reliable: false,
            metadata: None,
            peer: None,
            capabilities: Capabilities::default(),
            chunk_mtu: DEFAULT_CHUNK_MTU,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_pending_streams: Some(DEFAULT_MAX_PENDING_STREAMS),
            max_chunks_per_stream: Some(DEFAULT_MAX_CHUNKS_PER_STREAM),
        }
    }
}

/// Generate a connection id of the form `dc_<hex>`.
pub fn generate_connection_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{:016x}", CONNECTION_ID_PREFIX, rand_u64() ^ seq.rotate_left(48))
}

/// Simple random u64 using system time and process ID.
fn rand_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let pid = std::process::id() as u64;
    nanos.wrapping_mul(0x517cc1b727220a95) ^ pid
}
