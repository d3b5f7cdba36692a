//! JSON codec using `serde_json`.

use crate::error::Result;
use crate::payload::Payload;

/// JSON codec for the json serialization mode.
///
/// Outbound payloads become JSON text. Inbound text is always parsed into
/// [`Payload::Value`], so a text payload arrives as a JSON string value.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a payload to JSON text.
    #[inline]
    pub fn encode(payload: &Payload) -> Result<String> {
        Ok(serde_json::to_string(payload)?)
    }

    /// Parse JSON text.
    #[inline]
    pub fn decode(text: &str) -> Result<Payload> {
        Ok(Payload::Value(serde_json::from_str(text)?))
    }

    /// Parse JSON from bytes (binary frames in json mode).
    #[inline]
    pub fn decode_slice(bytes: &[u8]) -> Result<Payload> {
        Ok(Payload::Value(serde_json::from_slice(bytes)?))
    }
}
