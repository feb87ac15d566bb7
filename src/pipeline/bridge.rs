//! Boundaries between the engine and its host.
//!
//! Incoming messages arrive through an [`EventSource`] keyed by connection id;
//! merged batches leave through an [`UpdateDispatcher`] as a single zero-argument
//! "updated" notification, either to callbacks or to a coalescing channel.

use crate::pipeline::id::{ListenerId, SubscriptionId};
use crate::types::IncomingMessage;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked once per incoming message.
pub type MessageHandler = Arc<dyn Fn(IncomingMessage) + Send + Sync>;

/// Push-style message source, keyed by connection id.
#[cfg_attr(test, mockall::automock)]
pub trait EventSource: Send + Sync {
    fn subscribe(&self, connection_id: &str, handler: MessageHandler) -> SubscriptionId;

    fn unsubscribe(&self, connection_id: &str, subscription: SubscriptionId);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process [`EventSource`]: fan-out of published messages to the
/// handlers registered for a connection.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, MessageHandler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message` to every handler on `connection_id`.
    ///
    /// Returns the number of handlers reached. Handlers run on the calling
    /// thread, outside the bus lock, so they may (un)subscribe freely.
    pub fn publish(&self, connection_id: &str, message: IncomingMessage) -> usize {
        let handlers: Vec<MessageHandler> = lock(&self.handlers)
            .get(connection_id)
            .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::trace!(connection_id, topic = %message.topic, "No subscribers");
            return 0;
        }
        for handler in &handlers {
            handler(message.clone());
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, connection_id: &str) -> usize {
        lock(&self.handlers)
            .get(connection_id)
            .map_or(0, Vec::len)
    }
}

impl EventSource for EventBus {
    fn subscribe(&self, connection_id: &str, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers)
            .entry(connection_id.to_string())
            .or_default()
            .push((id, handler));
        tracing::debug!(connection_id, subscription = id.0, "Subscribed");
        id
    }

    fn unsubscribe(&self, connection_id: &str, subscription: SubscriptionId) {
        let mut handlers = lock(&self.handlers);
        if let Some(subs) = handlers.get_mut(connection_id) {
            subs.retain(|(id, _)| *id != subscription);
            if subs.is_empty() {
                handlers.remove(connection_id);
            }
        }
        tracing::debug!(connection_id, subscription = subscription.0, "Unsubscribed");
    }
}

/// Listener callback for the "updated" notification.
pub type UpdateListener = Box<dyn FnMut() + Send>;

/// Capacity of an update channel. One pending notification is enough: a
/// consumer that is behind only needs to know the tree changed.
const UPDATE_CHANNEL_CAPACITY: usize = 1;

/// Fans the "updated" notification out to listeners and channels.
#[derive(Default)]
pub struct UpdateDispatcher {
    listeners: Mutex<Vec<(ListenerId, UpdateListener)>>,
    channels: Mutex<Vec<Sender<()>>>,
    next_id: AtomicU64,
}

impl UpdateDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: UpdateListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, listener));
        id
    }

    /// Returns false if no listener had this id.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    /// Drop every listener and close every channel.
    pub fn remove_all_listeners(&self) {
        lock(&self.listeners).clear();
        lock(&self.channels).clear();
    }

    /// Receiver that gets one `()` per batch, coalesced while unread.
    pub fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = bounded(UPDATE_CHANNEL_CAPACITY);
        lock(&self.channels).push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len() + lock(&self.channels).len()
    }

    pub fn dispatch(&self) {
        for (_, listener) in lock(&self.listeners).iter_mut() {
            listener();
        }
        lock(&self.channels).retain(|tx| match tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        });
    }
}
