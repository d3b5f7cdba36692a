//! Channel events and subscriptions.
//!
//! Every subscriber owns an unbounded queue. Emitting never blocks the
//! channel driver; subscribers whose [`EventStream`] was dropped are pruned
//! on the next emit.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::payload::Payload;

/// Kinds of channel events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Transport ready.
    Open,
    /// Payload received.
    Data,
    /// Channel closed.
    Close,
    /// Error reported.
    Error,
}

impl EventKind {
    /// Event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Data => "data",
            EventKind::Close => "close",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EventKind::Open),
            "data" => Ok(EventKind::Data),
            "close" => Ok(EventKind::Close),
            "error" => Ok(EventKind::Error),
            other => Err(format!("unknown event: {}", other)),
        }
    }
}

/// Event raised by a data channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The transport is ready; sends are accepted from now on.
    Open,
    /// A payload arrived.
    Data(Payload),
    /// The channel closed. Raised exactly once.
    Close,
    /// Something went wrong. The channel keeps running unless a `Close` follows.
    Error(Arc<ChannelError>),
}

impl ChannelEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Open => EventKind::Open,
            ChannelEvent::Data(_) => EventKind::Data,
            ChannelEvent::Close => EventKind::Close,
            ChannelEvent::Error(_) => EventKind::Error,
        }
    }
}

struct Subscriber {
    /// Kinds to deliver (`None` = all).
    kinds: Option<Vec<EventKind>>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// Fan-out of channel events to subscribers.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> EventStream {
        self.add(None)
    }

    /// Subscribe to the given kinds only.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventStream {
        self.add(Some(kinds.to_vec()))
    }

    fn add(&self, kinds: Option<Vec<EventKind>>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Subscriber { kinds, tx });
        EventStream { rx }
    }

    /// Deliver an event to every interested subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn emit(&self, event: ChannelEvent) -> usize {
        let kind = event.kind();
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.wants(kind)) {
            if subscriber.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 && kind == EventKind::Error {
            if let ChannelEvent::Error(e) = &event {
                tracing::warn!("Unobserved channel error: {}", e);
            }
        }
        delivered
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.lock().len())
            .finish()
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl EventStream {
    /// Wait for the next event.
    ///
    /// Returns `None` once every [`DataChannel`](crate::DataChannel) handle
    /// and its driver are dropped and every event was consumed. `Close` does
    /// not end the stream: sends made through a live handle after closing
    /// still report `NotOpen` errors here. Stop at `Close` if that is the
    /// point of interest.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next `Data` payload, skipping other events.
    pub async fn next_data(&mut self) -> Option<Payload> {
        loop {
            if let ChannelEvent::Data(payload) = self.rx.recv().await? {
                return Some(payload);
            }
        }
    }

    /// Wait for the next event of the given kind, skipping others.
    pub async fn wait_for(&mut self, kind: EventKind) -> Option<ChannelEvent> {
        loop {
            let event = self.rx.recv().await?;
            if event.kind() == kind {
                return Some(event);
            }
        }
    }
}
