//! Serialization mode dispatch.
//!
//! | mode | outbound | inbound |
//! |---|---|---|
//! | `binary` | payload → MsgPack bytes | bytes → payload |
//! | `json` | payload → JSON text | JSON text → value |
//! | `none` | pass-through | pass-through |

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

use super::{JsonCodec, MsgPackCodec};
use crate::error::{ChannelError, Result};
use crate::payload::Payload;
use crate::protocol::Message;

/// How payloads are turned into transport frames and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Serialization {
    /// MessagePack; the only mode eligible for chunking.
    #[default]
    Binary,
    /// JSON text.
    Json,
    /// No serialization; text and bytes pass through unchanged.
    None,
}

/// Result of encoding a payload for the transport.
#[derive(Debug, PartialEq)]
pub enum Encoded {
    /// MsgPack buffer from binary mode. May still need chunking and a
    /// capability-dependent transport representation.
    Packed(Bytes),
    /// Ready-to-send message from json or none mode.
    Message(Message),
}

impl Serialization {
    /// Name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Serialization::Binary => "binary",
            Serialization::Json => "json",
            Serialization::None => "none",
        }
    }

    /// Check if this is the binary (MsgPack) mode.
    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, Serialization::Binary)
    }

    /// Encode an outbound payload.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for structured values in `none` mode, or the
    /// underlying codec error.
    pub fn encode(&self, payload: &Payload) -> Result<Encoded> {
        match self {
            Serialization::Binary => Ok(Encoded::Packed(MsgPackCodec::encode(payload)?)),
            Serialization::Json => Ok(Encoded::Message(Message::Text(JsonCodec::encode(payload)?))),
            Serialization::None => match payload {
                Payload::Text(text) => Ok(Encoded::Message(Message::Text(text.clone()))),
                Payload::Binary(data) => Ok(Encoded::Message(Message::Binary(data.clone()))),
                Payload::Value(_) => Err(ChannelError::Unsupported(
                    "structured values need the binary or json serialization".to_string(),
                )),
            },
        }
    }

    /// Decode an inbound byte frame.
    pub fn decode_bytes(&self, bytes: Bytes) -> Result<Payload> {
        match self {
            Serialization::Binary => MsgPackCodec::decode(&bytes),
            Serialization::Json => JsonCodec::decode_slice(&bytes),
            Serialization::None => Ok(Payload::Binary(bytes)),
        }
    }

    /// Decode an inbound text frame.
    ///
    /// Binary mode treats the text as a binary string (one byte per char).
    pub fn decode_text(&self, text: String) -> Result<Payload> {
        match self {
            Serialization::Binary => {
                let bytes = super::RawCodec::from_binary_string(&text)?;
                MsgPackCodec::decode(&bytes)
            }
            Serialization::Json => JsonCodec::decode(&text),
            Serialization::None => Ok(Payload::Text(text)),
        }
    }
}

impl fmt::Display for Serialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Serialization {
    type Err = std::convert::Infallible;

    /// Unknown names select pass-through.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "binary" | "binary-utf8" => Serialization::Binary,
            "json" => Serialization::Json,
            _ => Serialization::None,
        })
    }
}

impl<'de> Deserialize<'de> for Serialization {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(name.parse().unwrap_or_default())
    }
}
