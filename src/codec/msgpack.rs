//! MsgPack codec using `rmp-serde`.
//!
//! **CRITICAL**: Always use `to_vec_named`, NEVER `to_vec`!
//! Chunk frames are recognised by the `__peerData` key of a map; `to_vec`
//! would serialize structs as positional arrays and the remote peer would
//! treat every chunk as an ordinary payload.
//!
//! # Example
//!
//! ```
//! use peerwire::codec::MsgPackCodec;
//! use peerwire::Payload;
//!
//! let encoded = MsgPackCodec::encode(&Payload::from("hello")).unwrap();
//! let decoded: Payload = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Payload::from("hello"));
//! ```

use bytes::Bytes;

use crate::error::Result;

/// MessagePack codec for the binary serialization mode.
///
/// Uses `rmp_serde::to_vec_named` so structs are serialized as maps
/// (with field names) rather than arrays (positional).
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes> {
        // CRITICAL: to_vec_named, NOT to_vec!
        Ok(Bytes::from(rmp_serde::to_vec_named(value)?))
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Check whether the buffer starts with a MsgPack map marker.
    #[inline]
    pub fn is_map(bytes: &[u8]) -> bool {
        matches!(bytes.first(), Some(0x80..=0x8f | 0xde | 0xdf))
    }
}
