//! In-process transport and negotiator.
//!
//! Two [`MemoryEndpoint`]s created by [`MemoryEndpoint::pair`] deliver each
//! other's writes as [`TransportEvent::Message`]. Writes can be made to fail
//! on demand, which is how retry behavior is exercised without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};

use super::{Negotiator, Transport, TransportError, TransportEvent, TransportHandle};
use crate::config::ChannelConfig;
use crate::protocol::Message;

type EventTx = mpsc::UnboundedSender<TransportEvent>;
type EventRx = mpsc::UnboundedReceiver<TransportEvent>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write side of an in-memory endpoint.
#[derive(Debug)]
pub struct MemoryTransport {
    /// Every accepted write, in order.
    sent: Mutex<Vec<Message>>,
    /// Number of attempted writes, accepted or not.
    attempts: AtomicUsize,
    /// Writes still to reject before accepting again.
    fail_remaining: AtomicUsize,
    /// Reject every write while set.
    failing: AtomicBool,
    closed: AtomicBool,
    /// Own event stream, notified on close.
    local: EventTx,
    /// Remote event stream receiving our writes.
    remote: Mutex<Option<EventTx>>,
}

impl MemoryTransport {
    fn new(local: EventTx) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            local,
            remote: Mutex::new(None),
        }
    }

    /// Reject the next `n` writes with [`TransportError::Full`].
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::Release);
    }

    /// Reject every write until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Copies of all accepted writes.
    pub fn sent(&self) -> Vec<Message> {
        lock(&self.sent)
            .iter()
            .filter_map(Message::try_clone)
            .collect()
    }

    /// Number of accepted writes.
    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Number of attempted writes, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }

    /// Check if the transport has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close both directions. Later writes fail with [`TransportError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.local.send(TransportEvent::Closed);
        if let Some(remote) = lock(&self.remote).take() {
            let _ = remote.send(TransportEvent::Closed);
        }
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::Acquire) {
            return true;
        }
        self.fail_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, message: &Message) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::AcqRel);

        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.should_fail() {
            return Err(TransportError::Full);
        }

        let copy = || {
            message
                .try_clone()
                .ok_or_else(|| TransportError::Other("blob contents not in memory".to_string()))
        };

        if let Some(remote) = lock(&self.remote).as_ref() {
            let _ = remote.send(TransportEvent::Message(copy()?));
        }
        lock(&self.sent).push(copy()?);
        Ok(())
    }
}

/// One side of an in-memory connection.
///
/// Cloning yields another handle to the same endpoint.
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    transport: Arc<MemoryTransport>,
    events_tx: EventTx,
    // Handed out exactly once.
    events_rx: Arc<Mutex<Option<EventRx>>>,
}

impl MemoryEndpoint {
    /// Create an endpoint with no remote side. Writes are only recorded.
    pub fn detached() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport: Arc::new(MemoryTransport::new(events_tx.clone())),
            events_tx,
            events_rx: Arc::new(Mutex::new(Some(events_rx))),
        }
    }

    /// Create two endpoints delivering to each other.
    pub fn pair() -> (Self, Self) {
        let a = Self::detached();
        let b = Self::detached();
        *lock(&a.transport.remote) = Some(b.events_tx.clone());
        *lock(&b.transport.remote) = Some(a.events_tx.clone());
        (a, b)
    }

    /// The write side.
    pub fn transport(&self) -> Arc<MemoryTransport> {
        self.transport.clone()
    }

    /// Raise an event on this endpoint as if the transport produced it.
    pub fn signal(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Signal that the transport is ready.
    pub fn open(&self) {
        self.signal(TransportEvent::Open);
    }

    /// Take the handle for a channel. Returns `None` after the first call.
    pub fn take_handle(&self) -> Option<TransportHandle> {
        let events = lock(&self.events_rx).take()?;
        Some(TransportHandle::new(self.transport.clone(), events))
    }
}

/// Negotiator resolving immediately with a prepared endpoint.
#[derive(Debug, Default)]
pub struct MemoryNegotiator {
    /// Endpoints handed out by successive `start` calls.
    endpoints: Mutex<VecDeque<MemoryEndpoint>>,
    auto_open: bool,
    cleanups: Mutex<Vec<String>>,
}

impl MemoryNegotiator {
    /// Negotiator for one endpoint. Opening is left to [`MemoryEndpoint::open`].
    pub fn new(endpoint: MemoryEndpoint) -> Self {
        Self {
            endpoints: Mutex::new(VecDeque::from([endpoint])),
            ..Self::default()
        }
    }

    /// Negotiator that also signals `Open` right after handing out the transport.
    pub fn auto_open(endpoint: MemoryEndpoint) -> Self {
        Self {
            auto_open: true,
            ..Self::new(endpoint)
        }
    }

    /// Negotiator that never produces a transport.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Connection ids passed to `cleanup`, in call order.
    pub fn cleanups(&self) -> Vec<String> {
        lock(&self.cleanups).clone()
    }

    /// Number of `cleanup` calls.
    pub fn cleanup_count(&self) -> usize {
        lock(&self.cleanups).len()
    }
}

impl Negotiator for MemoryNegotiator {
    fn start(&self, config: &ChannelConfig, ready: oneshot::Sender<TransportHandle>) {
        let Some(endpoint) = lock(&self.endpoints).pop_front() else {
            tracing::debug!(connection_id = %config.connection_id, "No endpoint to negotiate");
            return;
        };
        let Some(handle) = endpoint.take_handle() else {
            tracing::debug!(connection_id = %config.connection_id, "Endpoint already in use");
            return;
        };

        if ready.send(handle).is_ok() && self.auto_open {
            endpoint.open();
        }
        // keep the endpoint reachable for cleanup
        lock(&self.endpoints).push_back(endpoint);
    }

    fn cleanup(&self, connection_id: &str) {
        lock(&self.cleanups).push(connection_id.to_string());
        for endpoint in lock(&self.endpoints).iter() {
            endpoint.transport.close();
        }
    }
}
