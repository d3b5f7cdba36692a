//! Chunk frames and the chunker.
//!
//! Oversized binary frames are split into chunk frames, each a MsgPack map:
//! ```text
//! ┌────────────┬───────┬──────────┬─────────┐
//! │ __peerData │ n     │ data     │ total   │
//! │ stream id  │ index │ bin      │ count   │
//! │ uint ≥ 1   │ 0..n  │ ≤ MTU    │ uint ≥ 1│
//! └────────────┴───────┴──────────┴─────────┘
//! ```
//!
//! The `__peerData` key is the chunk marker. Maps without it are ordinary
//! payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::error::{ChannelError, Result};

/// Default chunk payload size in bytes.
pub const DEFAULT_CHUNK_MTU: usize = 16300;

/// Map key that marks a chunk frame.
pub const CHUNK_MARKER: &str = "__peerData";

/// One piece of an oversized message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFrame {
    /// Groups all chunks of one original message.
    #[serde(rename = "__peerData")]
    pub stream_id: u32,
    /// 0-based position of this chunk.
    #[serde(rename = "n")]
    pub index: u32,
    /// Chunk bytes.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    /// Number of chunks in the stream.
    pub total: u32,
}

/// Loosely-typed view used to tell chunk frames from ordinary maps.
#[derive(Deserialize)]
struct ChunkProbe {
    #[serde(rename = "__peerData")]
    stream_id: Option<u32>,
    n: Option<u32>,
    data: Option<serde_bytes::ByteBuf>,
    total: Option<u32>,
}

impl ChunkFrame {
    /// Create a new chunk frame.
    pub fn new(stream_id: u32, index: u32, total: u32, data: Vec<u8>) -> Self {
        Self {
            stream_id,
            index,
            data,
            total,
        }
    }

    /// Encode to MsgPack (map format).
    pub fn encode(&self) -> Result<Bytes> {
        MsgPackCodec::encode(self)
    }

    /// Decode and validate a chunk frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let frame: ChunkFrame = MsgPackCodec::decode(bytes)?;
        frame.validate()?;
        Ok(frame)
    }

    /// Recognise a chunk frame.
    ///
    /// Returns:
    /// - `None` if the bytes are not a chunk frame (no marker)
    /// - `Some(Ok(frame))` for a well-formed chunk
    /// - `Some(Err(...))` if the marker is present but the frame is malformed
    pub fn detect(bytes: &[u8]) -> Option<Result<Self>> {
        if !MsgPackCodec::is_map(bytes) {
            return None;
        }

        let probe: ChunkProbe = MsgPackCodec::decode(bytes).ok()?;
        let stream_id = probe.stream_id?;

        let frame = match (probe.n, probe.data, probe.total) {
            (Some(index), Some(data), Some(total)) => {
                ChunkFrame::new(stream_id, index, total, data.into_vec())
            }
            _ => {
                return Some(Err(ChannelError::MalformedChunk(format!(
                    "stream {} is missing n, data or total",
                    stream_id
                ))))
            }
        };

        Some(frame.validate().map(|()| frame))
    }

    /// Validate header fields.
    ///
    /// Checks:
    /// - Total is at least 1
    /// - Index is below total
    pub fn validate(&self) -> Result<()> {
        if self.total == 0 {
            return Err(ChannelError::MalformedChunk(format!(
                "stream {} declares zero chunks",
                self.stream_id
            )));
        }

        if self.index >= self.total {
            return Err(ChannelError::MalformedChunk(format!(
                "stream {} chunk index {} out of range (total {})",
                self.stream_id, self.index, self.total
            )));
        }

        Ok(())
    }

    /// Check if this is the last chunk by position.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// Splits oversized frames into chunk frames.
///
/// Owns the stream id counter for one connection, so ids are unique for the
/// connection's lifetime (until the counter wraps).
#[derive(Debug)]
pub struct Chunker {
    mtu: usize,
    next_stream_id: u32,
}

impl Chunker {
    /// Create a chunker with the given chunk size (at least 1 byte).
    pub fn new(mtu: usize) -> Self {
        Self {
            mtu: mtu.max(1),
            next_stream_id: 1,
        }
    }

    /// Chunk payload size.
    #[inline]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Check if a frame of this size must be split.
    #[inline]
    pub fn needs_chunking(&self, len: usize) -> bool {
        len > self.mtu
    }

    /// Number of chunks a frame of this size splits into.
    #[inline]
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.mtu)
    }

    /// Split a frame into `ceil(len / mtu)` chunks sharing a fresh stream id.
    pub fn split(&mut self, data: &[u8]) -> Result<Vec<ChunkFrame>> {
        let total = u32::try_from(self.chunk_count(data.len())).map_err(|_| {
            ChannelError::Unsupported(format!("{} bytes needs too many chunks", data.len()))
        })?;
        let stream_id = self.allocate_stream_id();

        Ok(data
            .chunks(self.mtu)
            .enumerate()
            .map(|(index, piece)| ChunkFrame::new(stream_id, index as u32, total, piece.to_vec()))
            .collect())
    }

    fn allocate_stream_id(&mut self) -> u32 {
        let id = self.next_stream_id;
        // 0 is never used
        self.next_stream_id = self.next_stream_id.checked_add(1).unwrap_or(1);
        id
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_MTU)
    }
}
