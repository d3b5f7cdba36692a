//! Error types for peerwire.

use thiserror::Error;

use crate::channel::ChannelState;

/// Main error type for all data channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// `send` was called while the channel was not open.
    #[error("Connection is not open (state: {0}); listen for the open event before sending")]
    NotOpen(ChannelState),

    /// I/O error while reading a blob.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Inbound payload could not be decoded for the configured mode.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Payload cannot be represented in the configured mode.
    #[error("Unsupported payload: {0}")]
    Unsupported(String),

    /// Chunk frame with inconsistent header fields.
    #[error("Malformed chunk: {0}")]
    MalformedChunk(String),

    /// Error reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The negotiator never produced a transport.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;
