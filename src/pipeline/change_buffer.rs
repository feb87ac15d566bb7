//! Intake queue between the message source and the topic tree.
//!
//! `push` appends and never fails; `pop_all` swaps the whole queue out under
//! one lock, so a drain can never be observed half-done.
//!
//! The buffer is unbounded by default. That is the main backpressure risk of
//! the engine: a publisher burst while the tree is paused grows it without
//! limit. `with_capacity_limit` opts into a drop-oldest policy instead.

use crate::types::Message;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct ChangeBuffer {
    queue: Mutex<VecDeque<Message>>,
    /// `None` = unbounded.
    max_messages: Option<usize>,
    dropped: AtomicU64,
}

impl ChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounded buffer: once `max_messages` are queued, the oldest entry is
    /// discarded for every new one.
    pub fn with_capacity_limit(max_messages: usize) -> Self {
        Self {
            max_messages: Some(max_messages.max(1)),
            ..Self::default()
        }
    }

    pub fn capacity_limit(&self) -> Option<usize> {
        self.max_messages
    }

    pub fn push(&self, message: Message) {
        let mut queue = self.lock();
        if let Some(max) = self.max_messages {
            while queue.len() >= max {
                queue.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 {
                    tracing::warn!(max, "Change buffer full, dropping oldest messages");
                }
            }
        }
        queue.push_back(message);
    }

    /// Remove and return everything buffered, in arrival order.
    pub fn pop_all(&self) -> Vec<Message> {
        let drained = std::mem::take(&mut *self.lock());
        drained.into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of messages discarded by the capacity limit so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
