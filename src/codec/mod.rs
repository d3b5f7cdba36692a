//! Codec module - serialization/deserialization for payloads.
//!
//! This module provides codecs for encoding/decoding channel payloads:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (binary mode, chunk frames)
//! - [`JsonCodec`] - JSON text using `serde_json` (json mode)
//! - [`RawCodec`] - binary strings for text-only transports
//! - [`Serialization`] - the configured mode, dispatching to the codecs above
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.
//! The mode is fixed when the channel is built, so dispatch is a plain `match`.
//!
//! # Example
//!
//! ```
//! use peerwire::codec::{Encoded, Serialization};
//! use peerwire::Payload;
//!
//! let encoded = Serialization::Binary.encode(&Payload::from("hello")).unwrap();
//! let Encoded::Packed(bytes) = encoded else { unreachable!() };
//! let decoded = Serialization::Binary.decode_bytes(bytes).unwrap();
//! assert_eq!(decoded, Payload::from("hello"));
//! ```

mod json;
mod msgpack;
mod raw;
mod serialization;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;
pub use serialization::{Encoded, Serialization};
