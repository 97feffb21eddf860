//! Subscriber registry.
//!
//! Tracks the delivery channel of every active subscriber. The set and the
//! open/closed state of each channel only change under the registry mutex, so a
//! broadcast pass can never target a channel that has already been closed.
//! Delivery is `try_send`: the lock is never held across a wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::OsRng;
use rand::TryRngCore;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use postpulse_core::HubError;

/// One event body, shared by every subscriber it is delivered to.
pub type Payload = Arc<[u8]>;

/// Random subscriber identifier: 16 bytes from the OS, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    pub fn random() -> Result<Self, HubError> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| HubError::SubscriberId(e.to_string()))?;
        Ok(Self(hex::encode(bytes)))
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-side handle: the id to hand back on removal and the receiving end.
///
/// The channel yields `None` once the subscriber is removed or the hub closes.
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Payload>,
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Subscribers whose buffer was full (or whose receiver is gone).
    pub dropped: usize,
}

#[derive(Default)]
struct RegistryInner {
    senders: HashMap<SubscriberId, mpsc::Sender<Payload>>,
    closed: bool,
}

/// Thread-safe set of subscriber channels.
pub struct SubscriberRegistry {
    inner: Mutex<RegistryInner>,
    buffer: usize,
}

impl SubscriberRegistry {
    /// `buffer` is the per-subscriber channel capacity (at least 1).
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            buffer: buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber.
    ///
    /// After [`close_all`](Self::close_all) the returned channel is already closed.
    pub fn register(&self) -> Result<Subscriber, HubError> {
        let id = SubscriberId::random()?;
        let (tx, rx) = mpsc::channel(self.buffer);

        let mut inner = self.lock();
        if !inner.closed {
            inner.senders.insert(id.clone(), tx);
        }
        Ok(Subscriber { id, receiver: rx })
    }

    /// Remove a subscriber and close its channel. Returns `false` if it was not registered.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        // Dropping the only sender closes the channel.
        self.lock().senders.remove(id).is_some()
    }

    /// Offer `payload` to every subscriber without waiting.
    ///
    /// A subscriber that can't take it right now misses it but stays registered.
    pub fn broadcast(&self, payload: &Payload) -> Delivery {
        let inner = self.lock();
        let mut delivery = Delivery::default();

        for (id, tx) in &inner.senders {
            match tx.try_send(Arc::clone(payload)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(subscriber = %id, "subscriber busy, event skipped");
                    delivery.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!(subscriber = %id, "receiver dropped before removal");
                    delivery.dropped += 1;
                }
            }
        }
        delivery
    }

    /// Close every channel and refuse further registrations. Returns how many were open.
    pub fn close_all(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let open = inner.senders.len();
        inner.senders.clear();
        open
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.lock().senders.contains_key(id)
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.lock().senders.len()
    }

    /// Returns `true` if there are no registered subscribers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
