//! Cross-thread result delivery
//!
//! The listener thread hands every result to a [`ResultChannel`], which
//! forwards it to the single registered consumer. Delivery is a
//! fire-and-forget enqueue: the producer never waits for the consumer to
//! finish with a previous message, and results are delivered in the order
//! they were dispatched.
//!
//! A consumer is attached in one of two ways:
//! - [`ResultChannel::register`] moves a callback onto its own dispatch
//!   thread, which invokes it for every result.
//! - [`ResultChannel::subscribe`] returns a [`ResultReceiver`] that the caller
//!   drains on its own thread (e.g. a UI or main loop).
//!
//! Results dispatched while nobody is registered are dropped, never
//! replayed to a later consumer.

use crate::config::ListenerConfig;
use crate::types::{DecodedResponse, DecoderError, Result, ResultCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A single result handed to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub code: ResultCode,
    pub response: DecodedResponse,
}

/// Consumer of decoded results
///
/// Runs on the channel's dispatch thread, one call at a time, in dispatch
/// order.
pub trait ResultConsumer: Send + 'static {
    fn on_result(&mut self, code: ResultCode, response: DecodedResponse);
}

impl<F> ResultConsumer for F
where
    F: FnMut(ResultCode, DecodedResponse) + Send + 'static,
{
    fn on_result(&mut self, code: ResultCode, response: DecodedResponse) {
        self(code, response)
    }
}

/// What happened to a dispatched result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Enqueued for the registered consumer
    Delivered,
    /// No consumer registered; result dropped
    NoConsumer,
    /// Bounded queue full; result dropped
    QueueFull,
    /// Consumer went away; registration cleared and result dropped
    Disconnected,
}

enum DeliverySender {
    Unbounded(mpsc::Sender<Delivery>),
    Bounded(mpsc::SyncSender<Delivery>),
}

impl DeliverySender {
    fn try_send(&self, delivery: Delivery) -> std::result::Result<(), TrySendError<Delivery>> {
        match self {
            DeliverySender::Unbounded(tx) => tx
                .send(delivery)
                .map_err(|e| TrySendError::Disconnected(e.0)),
            DeliverySender::Bounded(tx) => tx.try_send(delivery),
        }
    }
}

struct Registration {
    id: u64,
    sender: DeliverySender,
}

struct Inner {
    slot: Mutex<Option<Registration>>,
    capacity: Option<usize>,
    next_id: AtomicU64,
}

/// Single-consumer delivery channel shared between producer and consumer
#[derive(Clone)]
pub struct ResultChannel {
    inner: Arc<Inner>,
}

impl ResultChannel {
    /// Create a channel with unbounded per-consumer queues
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a channel; `Some(n)` bounds each consumer queue to `n` results
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                capacity,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Create a channel sized by the listener configuration
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::with_capacity(config.queue_capacity)
    }

    /// Register a callback consumer, replacing any previous registration
    ///
    /// The callback runs on a dedicated dispatch thread. A replaced consumer
    /// still receives whatever was already queued for it, then its thread
    /// exits.
    pub fn register<C: ResultConsumer>(&self, mut consumer: C) -> Result<ConsumerHandle> {
        let (sender, receiver) = self.new_queue();

        let handle = thread::Builder::new()
            .name("can-consumer".to_string())
            .spawn(move || {
                for delivery in receiver.iter() {
                    consumer.on_result(delivery.code, delivery.response);
                }
                log::debug!("Consumer dispatch thread finished");
            })
            .map_err(DecoderError::ThreadSpawn)?;

        let id = self.install(sender);
        Ok(ConsumerHandle {
            id,
            handle: Some(handle),
        })
    }

    /// Subscribe a pull-based receiver, replacing any previous registration
    pub fn subscribe(&self) -> ResultReceiver {
        let (sender, receiver) = self.new_queue();
        let id = self.install(sender);
        ResultReceiver { id, receiver }
    }

    /// Drop the current registration, if any
    pub fn unregister(&self) {
        if let Some(previous) = self.lock_slot().take() {
            log::debug!("Consumer {} unregistered", previous.id);
        }
    }

    /// True if a consumer is currently registered
    pub fn has_consumer(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Deliver a result to the registered consumer without waiting for it
    pub fn dispatch(&self, code: ResultCode, response: DecodedResponse) -> DispatchStatus {
        let mut slot = self.lock_slot();

        let Some(registration) = slot.as_ref() else {
            log::trace!("No consumer registered, dropping {} result", code);
            return DispatchStatus::NoConsumer;
        };

        match registration.sender.try_send(Delivery { code, response }) {
            Ok(()) => DispatchStatus::Delivered,
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "Consumer {} queue full ({:?}), dropping {} result",
                    registration.id,
                    self.inner.capacity,
                    code
                );
                DispatchStatus::QueueFull
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Consumer {} disconnected, clearing registration", registration.id);
                *slot = None;
                DispatchStatus::Disconnected
            }
        }
    }

    fn new_queue(&self) -> (DeliverySender, mpsc::Receiver<Delivery>) {
        match self.inner.capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::sync_channel(capacity);
                (DeliverySender::Bounded(tx), rx)
            }
            None => {
                let (tx, rx) = mpsc::channel();
                (DeliverySender::Unbounded(tx), rx)
            }
        }
    }

    fn install(&self, sender: DeliverySender) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.lock_slot().replace(Registration { id, sender });
        match previous {
            Some(old) => log::debug!("Consumer {} replaced by consumer {}", old.id, id),
            None => log::debug!("Consumer {} registered", id),
        }
        id
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Registration>> {
        // The slot is only ever replaced whole, so a poisoned lock is still consistent
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ResultChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultChannel")
            .field("capacity", &self.inner.capacity)
            .field("has_consumer", &self.has_consumer())
            .finish()
    }
}

/// Handle to a callback consumer's dispatch thread
#[derive(Debug)]
pub struct ConsumerHandle {
    id: u64,
    handle: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait until the dispatch thread has drained its queue and exited
    ///
    /// Only returns once this consumer has been replaced or unregistered
    /// (or the channel dropped); returns false if the callback panicked.
    pub fn join(mut self) -> bool {
        match self.handle.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }
}

/// Pull side of a subscription, drained on the caller's own thread
#[derive(Debug)]
pub struct ResultReceiver {
    id: u64,
    receiver: mpsc::Receiver<Delivery>,
}

impl ResultReceiver {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the next result; None once replaced or the channel is gone
    pub fn recv(&self) -> Option<Delivery> {
        self.receiver.recv().ok()
    }

    /// Block up to `timeout` for the next result
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Delivery, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take the next result if one is already queued
    pub fn try_recv(&self) -> std::result::Result<Delivery, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain everything queued right now
    pub fn drain(&self) -> Vec<Delivery> {
        self.receiver.try_iter().collect()
    }
}
