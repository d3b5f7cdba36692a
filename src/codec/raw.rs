//! Raw codec - binary strings.
//!
//! Transports that only carry text still need to move binary frames. A
//! binary string stores one byte per character (code points 0-255), so the
//! conversion is lossless in both directions.
//!
//! # Example
//!
//! ```
//! use peerwire::codec::RawCodec;
//!
//! let text = RawCodec::to_binary_string(&[0x00, 0x7f, 0xff]);
//! assert_eq!(text.chars().count(), 3);
//!
//! let bytes = RawCodec::from_binary_string(&text).unwrap();
//! assert_eq!(&bytes[..], &[0x00, 0x7f, 0xff]);
//! ```

use bytes::Bytes;

use crate::error::{ChannelError, Result};

/// Converts between byte buffers and binary strings.
pub struct RawCodec;

impl RawCodec {
    /// Encode bytes as a binary string, one character per byte.
    pub fn to_binary_string(data: &[u8]) -> String {
        data.iter().map(|&b| char::from(b)).collect()
    }

    /// Decode a binary string back into bytes.
    ///
    /// # Errors
    ///
    /// Returns `Decode` if a character is outside the single-byte range,
    /// which means the text was never a binary string.
    pub fn from_binary_string(text: &str) -> Result<Bytes> {
        let mut out = Vec::with_capacity(text.len());
        for (pos, ch) in text.chars().enumerate() {
            let byte = u8::try_from(u32::from(ch)).map_err(|_| {
                ChannelError::Decode(format!(
                    "character U+{:04X} at position {} is not a binary string byte",
                    u32::from(ch),
                    pos
                ))
            })?;
            out.push(byte);
        }
        Ok(Bytes::from(out))
    }
}
