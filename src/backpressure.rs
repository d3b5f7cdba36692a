//! Send buffering for transports that reject writes.
//!
//! A rejected write is never dropped. The [`SendBuffer`] keeps it at the head
//! of a FIFO queue, stops sending new frames directly, and schedules a retry.
//! When the retry is due the queue drains head first until it is empty or the
//! transport rejects again.
//!
//! # Usage
//!
//! The buffer holds no timer of its own. The channel driver sleeps until
//! [`SendBuffer::retry_deadline`] and then calls [`SendBuffer::try_buffer`].
//!
//! # Configuration
//!
//! - `retry_delay`: Delay between a rejected write and the next attempt (default: 100ms)

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::Message;
use crate::transport::Transport;

/// Default delay before retrying a rejected write.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Ordered queue of frames waiting for the transport.
#[derive(Debug)]
pub struct SendBuffer {
    /// Frames not yet accepted by the transport, oldest first.
    queue: VecDeque<Message>,
    /// Set by a rejected write; cleared when the retry fires.
    buffering: bool,
    /// Delay between a rejection and the retry.
    retry_delay: Duration,
    /// When the scheduled retry is due.
    retry_at: Option<Instant>,
}

impl SendBuffer {
    /// Create a buffer with the given retry delay.
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            buffering: false,
            retry_delay,
            retry_at: None,
        }
    }

    /// Write one frame.
    ///
    /// Returns `true` if the transport accepted it. On rejection the buffer
    /// switches to buffering and a retry is scheduled.
    pub fn try_send(&mut self, transport: &dyn Transport, frame: &Message) -> bool {
        match transport.send(frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    kind = frame.kind(),
                    queued = self.queue.len(),
                    "Transport rejected write, retrying in {:?}: {}",
                    self.retry_delay,
                    e
                );
                self.buffering = true;
                self.retry_at = Some(Instant::now() + self.retry_delay);
                false
            }
        }
    }

    /// Send a frame, or queue it behind earlier frames.
    ///
    /// Returns `true` if the frame was written immediately.
    pub fn buffered_send(&mut self, transport: &dyn Transport, frame: Message) -> bool {
        if self.buffering {
            self.queue.push_back(frame);
            return false;
        }

        if self.try_send(transport, &frame) {
            return true;
        }
        self.queue.push_back(frame);
        false
    }

    /// Retry queued frames in order.
    ///
    /// Clears the pending retry, then writes frames from the head until the
    /// queue is empty or a write is rejected (which schedules the next retry).
    /// Returns the number of frames written.
    pub fn try_buffer(&mut self, transport: &dyn Transport) -> usize {
        self.retry_at = None;
        self.buffering = false;

        let mut written = 0;
        while let Some(head) = self.queue.pop_front() {
            if !self.try_send(transport, &head) {
                self.queue.push_front(head);
                break;
            }
            written += 1;
        }

        if written > 0 {
            tracing::debug!(written, remaining = self.queue.len(), "Drained send buffer");
        }
        written
    }

    /// When the next retry is due, if one is scheduled.
    #[inline]
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Check if new frames are being queued instead of sent.
    #[inline]
    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Number of queued frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if no frame is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop all queued frames and the pending retry.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.buffering = false;
        self.retry_at = None;
    }
}

impl Default for SendBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}
