//! Protocol module - transport messages, chunk frames, and reassembly.
//!
//! This module implements the framing layer between payload codecs and
//! the transport:
//! - [`Message`] frames in their transport representation (text, bytes, blob)
//! - [`ChunkFrame`] encoding and recognition
//! - [`Chunker`] for splitting oversized binary frames
//! - [`Reassembler`] for rebuilding them on the receiving side

mod chunk;
mod message;
mod reassembler;

pub use chunk::{ChunkFrame, Chunker, CHUNK_MARKER, DEFAULT_CHUNK_MTU};
pub use message::{Blob, Message};
pub use reassembler::{Reassembler, DEFAULT_MAX_CHUNKS_PER_STREAM, DEFAULT_MAX_PENDING_STREAMS};
