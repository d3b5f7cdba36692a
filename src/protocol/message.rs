//! Units crossing the transport boundary.
//!
//! A transport hands the channel one of three shapes:
//! - `Text`: a string frame
//! - `Binary`: a byte buffer
//! - `Blob`: a binary object whose contents may need an asynchronous read
//!
//! # Example
//!
//! ```
//! use peerwire::protocol::{Blob, Message};
//! use bytes::Bytes;
//!
//! let blob = Blob::from_bytes(Bytes::from_static(b"ready"));
//! assert_eq!(blob.size(), Some(5));
//!
//! let msg = Message::Blob(blob);
//! assert_eq!(msg.kind(), "blob");
//! ```

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Boxed future resolving to a blob's contents.
type ReadFuture = Pin<Box<dyn Future<Output = io::Result<Bytes>> + Send + 'static>>;

enum BlobInner {
    Ready(Bytes),
    Pending(ReadFuture),
}

/// Binary object whose contents are read asynchronously.
///
/// Blobs built from bytes are readable immediately; blobs built from a
/// future or an `AsyncRead` only yield their contents through [`Blob::read`].
pub struct Blob {
    inner: BlobInner,
}

impl Blob {
    /// Create a blob over bytes that are already in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            inner: BlobInner::Ready(data.into()),
        }
    }

    /// Create a blob whose contents are produced by a future.
    pub fn from_future<F>(read: F) -> Self
    where
        F: Future<Output = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: BlobInner::Pending(Box::pin(read)),
        }
    }

    /// Create a blob that reads an `AsyncRead` to the end.
    pub fn from_reader<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::from_future(async move {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await?;
            Ok(Bytes::from(buf))
        })
    }

    /// Contents, if they are already in memory.
    #[inline]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.inner {
            BlobInner::Ready(data) => Some(data),
            BlobInner::Pending(_) => None,
        }
    }

    /// Size in bytes, if known without reading.
    #[inline]
    pub fn size(&self) -> Option<usize> {
        self.as_bytes().map(Bytes::len)
    }

    /// Take the contents without reading, or hand the blob back if a read is needed.
    pub fn try_into_bytes(self) -> std::result::Result<Bytes, Blob> {
        match self.inner {
            BlobInner::Ready(data) => Ok(data),
            inner => Err(Blob { inner }),
        }
    }

    /// Read the full contents.
    pub async fn read(self) -> io::Result<Bytes> {
        match self.inner {
            BlobInner::Ready(data) => Ok(data),
            BlobInner::Pending(read) => read.await,
        }
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            BlobInner::Ready(data) => f.debug_struct("Blob").field("size", &data.len()).finish(),
            BlobInner::Pending(_) => f.debug_struct("Blob").field("size", &"pending").finish(),
        }
    }
}

impl From<Bytes> for Blob {
    fn from(data: Bytes) -> Self {
        Self::from_bytes(data)
    }
}

/// A message as seen by the transport.
#[derive(Debug)]
pub enum Message {
    /// String frame.
    Text(String),
    /// Byte buffer frame.
    Binary(Bytes),
    /// Binary object, possibly requiring an asynchronous read.
    Blob(Blob),
}

impl Message {
    /// Short name of the message shape, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Text(_) => "text",
            Message::Binary(_) => "binary",
            Message::Blob(_) => "blob",
        }
    }

    /// Size in bytes, if known without reading.
    pub fn size(&self) -> Option<usize> {
        match self {
            Message::Text(text) => Some(text.len()),
            Message::Binary(data) => Some(data.len()),
            Message::Blob(blob) => blob.size(),
        }
    }

    /// Get the text, if this is a text frame.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the bytes of a binary frame or an in-memory blob.
    #[inline]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Message::Binary(data) => Some(data),
            Message::Blob(blob) => blob.as_bytes(),
            Message::Text(_) => None,
        }
    }

    /// Clone the message. Blobs that still need a read cannot be cloned.
    pub fn try_clone(&self) -> Option<Message> {
        match self {
            Message::Text(text) => Some(Message::Text(text.clone())),
            Message::Binary(data) => Some(Message::Binary(data.clone())),
            Message::Blob(blob) => blob
                .as_bytes()
                .map(|data| Message::Blob(Blob::from_bytes(data.clone()))),
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Message::Text(a), Message::Text(b)) => a == b,
            (Message::Binary(a), Message::Binary(b)) => a == b,
            (Message::Blob(a), Message::Blob(b)) => match (a.as_bytes(), b.as_bytes()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Message::Binary(data)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(Bytes::from(data))
    }
}
