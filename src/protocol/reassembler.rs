//! Reassembly of chunked messages.
//!
//! Chunks are collected per stream id and keyed by index, so arrival order
//! does not matter and repeated chunks overwrite in place. Storage grows with
//! the chunks actually received, never with the total a peer declares, and
//! the declared total is capped per stream. A stream completes the moment
//! every index is filled; its entry is removed and the joined bytes are
//! returned.
//!
//! # Example
//!
//! ```
//! use peerwire::protocol::{Chunker, Reassembler};
//!
//! let mut chunker = Chunker::new(4);
//! let mut reassembler = Reassembler::new();
//!
//! let mut chunks = chunker.split(b"hello world").unwrap();
//! chunks.reverse();
//!
//! let mut done = None;
//! for chunk in chunks {
//!     done = reassembler.push(chunk).unwrap();
//! }
//! assert_eq!(&done.unwrap()[..], b"hello world");
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};

use bytes::{Bytes, BytesMut};

use super::ChunkFrame;
use crate::error::{ChannelError, Result};

/// Default bound on concurrently incomplete streams.
pub const DEFAULT_MAX_PENDING_STREAMS: usize = 1024;

/// Default cap on the declared chunk count of one stream.
///
/// At the default MTU this admits messages of roughly 1 GiB.
pub const DEFAULT_MAX_CHUNKS_PER_STREAM: u32 = 65_536;

/// Partially received stream.
#[derive(Debug)]
struct PendingStream {
    /// Declared chunk count.
    total: u32,
    /// Received chunks by index.
    chunks: BTreeMap<u32, Vec<u8>>,
}

impl PendingStream {
    fn new(total: u32) -> Self {
        Self {
            total,
            chunks: BTreeMap::new(),
        }
    }

    fn filled(&self) -> usize {
        self.chunks.len()
    }

    fn is_complete(&self) -> bool {
        self.filled() == self.total as usize
    }

    fn join(self) -> Bytes {
        let size = self.chunks.values().map(Vec::len).sum();
        let mut out = BytesMut::with_capacity(size);
        for chunk in self.chunks.into_values() {
            out.extend_from_slice(&chunk);
        }
        out.freeze()
    }
}

/// Per-connection store of incomplete chunked messages.
#[derive(Debug)]
pub struct Reassembler {
    /// Incomplete streams by id.
    streams: HashMap<u32, PendingStream>,
    /// Stream ids in arrival order of their first chunk, for eviction.
    order: VecDeque<u32>,
    /// Maximum number of incomplete streams (`None` = unbounded).
    max_pending: Option<usize>,
    /// Maximum declared chunk count per stream (`None` = unbounded).
    max_chunks: Option<u32>,
}

impl Reassembler {
    /// Create a reassembler with the default bound.
    pub fn new() -> Self {
        Self::with_max_pending(Some(DEFAULT_MAX_PENDING_STREAMS))
    }

    /// Create a reassembler with a custom bound on incomplete streams.
    ///
    /// `None` keeps incomplete streams for the connection's lifetime.
    pub fn with_max_pending(max_pending: Option<usize>) -> Self {
        Self {
            streams: HashMap::new(),
            order: VecDeque::new(),
            max_pending: max_pending.map(|max| max.max(1)),
            max_chunks: Some(DEFAULT_MAX_CHUNKS_PER_STREAM),
        }
    }

    /// Set the cap on the chunk count a stream may declare.
    ///
    /// Chunks declaring more are rejected before anything is stored.
    pub fn with_max_chunks(mut self, max_chunks: Option<u32>) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    /// Accept one chunk.
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` when this chunk completed its stream
    /// - `Ok(None)` if more chunks are needed
    /// - `Err(...)` if the chunk contradicts its stream (bad index or total)
    ///   or declares more chunks than the cap
    pub fn push(&mut self, chunk: ChunkFrame) -> Result<Option<Bytes>> {
        chunk.validate()?;

        if let Some(max) = self.max_chunks {
            if chunk.total > max {
                return Err(ChannelError::MalformedChunk(format!(
                    "stream {} declares {} chunks (limit {})",
                    chunk.stream_id, chunk.total, max
                )));
            }
        }

        if let Some(existing) = self.streams.get(&chunk.stream_id) {
            if existing.total != chunk.total {
                return Err(ChannelError::MalformedChunk(format!(
                    "stream {} declared total {} but earlier chunks said {}",
                    chunk.stream_id, chunk.total, existing.total
                )));
            }
        } else {
            self.make_room();
            self.streams
                .insert(chunk.stream_id, PendingStream::new(chunk.total));
            self.order.push_back(chunk.stream_id);
        }

        let stream_id = chunk.stream_id;
        let complete = match self.streams.get_mut(&stream_id) {
            Some(stream) => {
                stream.chunks.insert(chunk.index, chunk.data);
                stream.is_complete()
            }
            None => false,
        };

        if !complete {
            return Ok(None);
        }

        self.order.retain(|id| *id != stream_id);
        Ok(self.streams.remove(&stream_id).map(PendingStream::join))
    }

    /// Evict the oldest incomplete stream if the bound is reached.
    fn make_room(&mut self) {
        let Some(max) = self.max_pending else {
            return;
        };

        while self.streams.len() >= max {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(stream) = self.streams.remove(&oldest) {
                tracing::warn!(
                    stream_id = oldest,
                    received = stream.filled(),
                    total = stream.total,
                    "Evicting incomplete chunked message"
                );
            }
        }
    }

    /// Number of incomplete streams.
    pub fn pending_streams(&self) -> usize {
        self.streams.len()
    }

    /// Progress of an incomplete stream as `(received, total)`.
    pub fn progress(&self, stream_id: u32) -> Option<(usize, usize)> {
        self.streams
            .get(&stream_id)
            .map(|stream| (stream.filled(), stream.total as usize))
    }

    /// Check if no stream is incomplete.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Drop all incomplete streams.
    pub fn clear(&mut self) {
        self.streams.clear();
        self.order.clear();
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
