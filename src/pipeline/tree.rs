//! Live topic tree: intake, buffering and batched merging.
//!
//! # Lifecycle
//!
//! ```text
//!            connect()          start()
//!   Idle ─────────────▶ Subscribed ──────▶ Running ◀──▶ Paused
//!    ▲                                        │   pause()/resume()
//!    └──────────── stop_updating() ───────────┘
//!
//!   any state ── destroy() ──▶ Destroyed
//! ```
//!
//! `update_with_connection` performs `connect` and `start` in one step.
//!
//! # Threading
//!
//! Messages are accepted on whatever thread the [`EventSource`] calls the
//! handler from. The handler preprocesses and appends to the shared
//! [`ChangeBuffer`]; it never touches the tree. Everything else runs on the
//! thread that owns the `Tree`, driven by the host:
//!
//! - [`Tree::pump`] consumes elapsed cadence ticks and runs at most one merge.
//! - [`Tree::run_idle`] runs a merge deferred to the host's idle moment.
//! - [`Tree::apply_unmerged_changes`] drains and merges immediately.

use crate::config::EngineConfig;
use crate::error::{Result, TopicTreeError};
use crate::pipeline::bridge::{EventSource, MessageHandler, UpdateDispatcher, UpdateListener};
use crate::pipeline::change_buffer::ChangeBuffer;
use crate::pipeline::id::{ListenerId, SubscriptionId, TreeIdentity};
use crate::pipeline::preprocessor::{Preprocessor, PreprocessorKind};
use crate::pipeline::topic_tree::{TopicTree, ViewModel};
use crate::types::{IncomingMessage, Message};
use crossbeam_channel::Receiver;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Predicate deciding whether a message is merged: `(full topic path, message)`.
pub type NodeFilter = Arc<dyn Fn(&str, Option<&Message>) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    Idle,
    Subscribed,
    Running,
    Paused,
    Destroyed,
}

/// The part of a tree shared with the message handler.
#[derive(Debug, Default)]
struct Intake {
    buffer: ChangeBuffer,
    preprocessor: RwLock<Preprocessor>,
}

impl Intake {
    fn receive(&self, incoming: IncomingMessage) {
        let preprocessor = self
            .preprocessor
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for message in preprocessor.apply(Message::from(incoming)) {
            self.buffer.push(message);
        }
    }
}

struct Connection {
    source: Arc<dyn EventSource>,
    connection_id: String,
    subscription: SubscriptionId,
}

/// A topic tree kept up to date from a live message source.
pub struct Tree<V: ViewModel = ()> {
    topics: TopicTree<V>,
    identity: TreeIdentity,
    config: EngineConfig,
    intake: Arc<Intake>,
    connection: Option<Connection>,
    filter: Option<NodeFilter>,
    ticker: Option<Receiver<Instant>>,
    /// Set while a merge is deferred to the host's idle hook.
    idle_pending_since: Option<Instant>,
    paused: bool,
    merge_in_flight: AtomicBool,
    destroyed: bool,
    updates: UpdateDispatcher,
}

impl<V: ViewModel> Default for Tree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ViewModel> Tree<V> {
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_preprocessor(kind: PreprocessorKind) -> Self {
        Self::with_config(&EngineConfig {
            preprocessor: kind,
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let buffer = match config.buffer.max_messages {
            Some(max) => ChangeBuffer::with_capacity_limit(max),
            None => ChangeBuffer::new(),
        };
        Self {
            topics: TopicTree::with_history_capacity(config.tree.history_capacity),
            identity: TreeIdentity::generate(),
            config: config.clone(),
            intake: Arc::new(Intake {
                buffer,
                preprocessor: RwLock::new(Preprocessor::from_kind(config.preprocessor)),
            }),
            connection: None,
            filter: None,
            ticker: None,
            idle_pending_since: None,
            paused: false,
            merge_in_flight: AtomicBool::new(false),
            destroyed: false,
            updates: UpdateDispatcher::new(),
        }
    }

    /// Random identity fixed at construction. Not a content hash.
    pub fn identity(&self) -> TreeIdentity {
        self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn topics(&self) -> &TopicTree<V> {
        &self.topics
    }

    pub fn state(&self) -> TreeState {
        if self.destroyed {
            TreeState::Destroyed
        } else if self.connection.is_none() {
            TreeState::Idle
        } else if self.ticker.is_none() {
            TreeState::Subscribed
        } else if self.paused {
            TreeState::Paused
        } else {
            TreeState::Running
        }
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.connection_id.as_str())
    }

    pub fn source(&self) -> Option<&Arc<dyn EventSource>> {
        self.connection.as_ref().map(|c| &c.source)
    }

    pub fn node_filter(&self) -> Option<&NodeFilter> {
        self.filter.as_ref()
    }

    pub fn preprocessor_kind(&self) -> PreprocessorKind {
        self.config.preprocessor
    }

    /// Swap the preprocessor. Applies to messages received from now on.
    pub fn set_preprocessor(&mut self, kind: PreprocessorKind) {
        *self
            .intake
            .preprocessor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Preprocessor::from_kind(kind);
        self.config.preprocessor = kind;
        tracing::info!(tree = %self.identity, ?kind, "Preprocessor changed");
    }

    /// Messages received but not merged yet.
    pub fn unmerged_changes(&self) -> &ChangeBuffer {
        &self.intake.buffer
    }

    /// Accept one message directly, as the source handler would.
    pub fn receive(&self, incoming: IncomingMessage) {
        self.intake.receive(incoming);
    }

    /// Subscribe to `connection_id` on `source` and start buffering.
    ///
    /// An existing subscription is released first.
    pub fn connect(
        &mut self,
        source: Arc<dyn EventSource>,
        connection_id: &str,
        filter: Option<NodeFilter>,
    ) -> Result<()> {
        self.ensure_alive("connect")?;
        if self.connection.is_some() {
            self.stop_updating();
        }

        let intake = self.intake.clone();
        let handler: MessageHandler = Arc::new(move |incoming| intake.receive(incoming));
        let subscription = source.subscribe(connection_id, handler);

        tracing::info!(tree = %self.identity, connection_id, "Tree connected");
        self.connection = Some(Connection {
            source,
            connection_id: connection_id.to_string(),
            subscription,
        });
        self.filter = filter;
        Ok(())
    }

    /// Start the merge cadence.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_alive("start")?;
        if self.connection.is_none() {
            return Err(TopicTreeError::InvalidState(
                "cannot start merging without a connection".to_string(),
            ));
        }
        let interval = self.config.merge.interval();
        self.ticker = Some(crossbeam_channel::tick(interval));
        tracing::debug!(tree = %self.identity, ?interval, "Merge cadence started");
        Ok(())
    }

    /// `connect` + `start`.
    pub fn update_with_connection(
        &mut self,
        source: Arc<dyn EventSource>,
        connection_id: &str,
        filter: Option<NodeFilter>,
    ) -> Result<()> {
        self.connect(source, connection_id, filter)?;
        self.start()
    }

    /// Unsubscribe and stop the cadence. Tree contents are kept.
    pub fn stop_updating(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection
                .source
                .unsubscribe(&connection.connection_id, connection.subscription);
            tracing::info!(
                tree = %self.identity,
                connection_id = %connection.connection_id,
                "Tree disconnected"
            );
        }
        self.ticker = None;
        self.idle_pending_since = None;
        self.merge_in_flight.store(false, Ordering::Release);
    }

    /// Skip merges until `resume`. Intake keeps buffering.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Consume elapsed cadence ticks, then force an idle-deferred merge whose
    /// timeout has passed. Never blocks. Returns true if a merge ran.
    pub fn pump(&mut self) -> bool {
        let ticks = self.ticker.as_ref().map_or(0, |t| t.try_iter().count());
        let mut merged = ticks > 0 && self.tick();

        if let Some(since) = self.idle_pending_since {
            if since.elapsed() >= self.config.merge.idle_timeout() {
                tracing::trace!(tree = %self.identity, "Idle timeout elapsed, forcing merge");
                merged |= self.run_idle();
            }
        }
        merged
    }

    /// Block up to `timeout` for the next cadence tick, then `pump`.
    pub fn wait_and_pump(&mut self, timeout: Duration) -> bool {
        if let Some(ticker) = &self.ticker {
            if ticker.recv_timeout(timeout).is_ok() {
                let merged = self.tick();
                return self.pump() || merged;
            }
        }
        self.pump()
    }

    /// One cadence step. Runs or defers a merge unless paused or one is
    /// already in flight.
    pub fn tick(&mut self) -> bool {
        if self.destroyed || self.paused {
            return false;
        }
        if self.merge_in_flight.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.config.merge.defer_to_idle {
            self.idle_pending_since = Some(Instant::now());
            return false;
        }
        self.apply_unmerged_changes();
        true
    }

    /// Run the merge deferred by the last tick, if any.
    pub fn run_idle(&mut self) -> bool {
        if self.idle_pending_since.take().is_none() {
            return false;
        }
        self.apply_unmerged_changes();
        true
    }

    /// True while a tick has claimed the merge and it hasn't completed.
    pub fn is_merge_in_flight(&self) -> bool {
        self.merge_in_flight.load(Ordering::Acquire)
    }

    /// Drain the buffer, merge every message passing the filter and emit one
    /// "updated" notification. Returns the number of messages merged.
    pub fn apply_unmerged_changes(&mut self) -> usize {
        let batch = self.intake.buffer.pop_all();
        let received = batch.len();
        let mut merged = 0;

        for message in batch {
            let path = message.path();
            if path.is_empty() {
                tracing::warn!(topic = %message.topic, "Dropping message with empty topic");
                continue;
            }
            if let Some(filter) = &self.filter {
                if !filter(&path.to_string(), Some(&message)) {
                    continue;
                }
            }
            if let Some(fragment) = TopicTree::from_message(message) {
                self.topics.update_with_node(fragment);
                merged += 1;
            }
        }

        if received > 0 {
            tracing::debug!(tree = %self.identity, received, merged, "Merged batch");
        }
        self.updates.dispatch();
        self.merge_in_flight.store(false, Ordering::Release);
        merged
    }

    pub fn on_update(&self, listener: UpdateListener) -> ListenerId {
        self.updates.add_listener(listener)
    }

    pub fn remove_update_listener(&self, id: ListenerId) -> bool {
        self.updates.remove_listener(id)
    }

    /// Channel receiving one `()` per merged batch, coalesced while unread.
    pub fn subscribe_updates(&self) -> Receiver<()> {
        self.updates.subscribe()
    }

    /// Tear down: stop updating, drop listeners and destroy view models.
    /// Idempotent; also runs on drop.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop_updating();
        self.updates.remove_all_listeners();
        self.topics.destroy_view_models();
        self.destroyed = true;
        tracing::info!(tree = %self.identity, "Tree destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn ensure_alive(&self, operation: &str) -> Result<()> {
        if self.destroyed {
            return Err(TopicTreeError::InvalidState(format!(
                "cannot {} a destroyed tree",
                operation
            )));
        }
        Ok(())
    }
}

impl<V: ViewModel> Deref for Tree<V> {
    type Target = TopicTree<V>;

    fn deref(&self) -> &Self::Target {
        &self.topics
    }
}

impl<V: ViewModel> DerefMut for Tree<V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.topics
    }
}

impl<V: ViewModel> Drop for Tree<V> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bridge::{EventBus, MockEventSource};
    use mockall::predicate::eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn text(topic: &str, payload: &str) -> IncomingMessage {
        IncomingMessage::new(topic, Some(payload.as_bytes().to_vec()))
    }

    fn connected(bus: &Arc<EventBus>) -> Tree {
        let mut tree = Tree::new();
        tree.update_with_connection(bus.clone(), "conn", None).unwrap();
        tree
    }

    #[test]
    fn test_initial_state() {
        let tree: Tree = Tree::new();
        assert_eq!(tree.state(), TreeState::Idle);
        assert!(tree.is_empty());
        assert!(tree.connection_id().is_none());
        assert_eq!(tree.preprocessor_kind(), PreprocessorKind::None);
    }

    #[test]
    fn test_identity_is_stable_across_mutation() {
        let mut tree: Tree = Tree::new();
        let before = tree.identity();
        tree.receive(text("a", "1"));
        tree.apply_unmerged_changes();
        assert_eq!(tree.identity(), before);
        assert_ne!(Tree::<()>::new().identity(), before);
    }

    #[test]
    fn test_subscribe_and_unsubscribe_with_mock_source() {
        let captured: Arc<Mutex<Option<MessageHandler>>> = Arc::new(Mutex::new(None));
        let mut source = MockEventSource::new();
        let slot = captured.clone();
        source
            .expect_subscribe()
            .withf(|connection_id, _| connection_id == "conn-1")
            .times(1)
            .returning(move |_, handler| {
                *slot.lock().unwrap() = Some(handler);
                SubscriptionId(7)
            });
        source
            .expect_unsubscribe()
            .with(eq("conn-1"), eq(SubscriptionId(7)))
            .times(1)
            .return_const(());

        let mut tree: Tree = Tree::new();
        tree.update_with_connection(Arc::new(source), "conn-1", None)
            .unwrap();
        assert_eq!(tree.state(), TreeState::Running);
        assert_eq!(tree.connection_id(), Some("conn-1"));

        let handler = captured.lock().unwrap().clone().unwrap();
        handler(text("x/y", "1"));
        assert_eq!(tree.unmerged_changes().len(), 1);

        tree.destroy();
        assert_eq!(tree.state(), TreeState::Destroyed);
    }

    #[test]
    fn test_reconnect_releases_previous_subscription() {
        let mut first = MockEventSource::new();
        first.expect_subscribe().times(1).return_const(SubscriptionId(1));
        first
            .expect_unsubscribe()
            .with(eq("a"), eq(SubscriptionId(1)))
            .times(1)
            .return_const(());

        let mut second = MockEventSource::new();
        second.expect_subscribe().times(1).return_const(SubscriptionId(2));
        second.expect_unsubscribe().times(1).return_const(());

        let mut tree: Tree = Tree::new();
        tree.update_with_connection(Arc::new(first), "a", None).unwrap();
        tree.update_with_connection(Arc::new(second), "b", None).unwrap();
        assert_eq!(tree.connection_id(), Some("b"));
    }

    #[test]
    fn test_connect_then_start() {
        let bus = Arc::new(EventBus::new());
        let mut tree: Tree = Tree::new();
        assert!(tree.start().is_err());

        tree.connect(bus.clone(), "conn", None).unwrap();
        assert_eq!(tree.state(), TreeState::Subscribed);
        tree.start().unwrap();
        assert_eq!(tree.state(), TreeState::Running);
    }

    #[test]
    fn test_batch_merge_emits_single_update() {
        let bus = Arc::new(EventBus::new());
        let mut tree = connected(&bus);
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = updates.clone();
        tree.on_update(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish("conn", text("home/temp", "20"));
        bus.publish("conn", text("home/humidity", "40"));
        bus.publish("conn", text("home/temp", "21"));
        assert!(tree.is_empty());

        assert!(tree.tick());
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(tree.message_at("home/temp").unwrap().payload_text(), Some("21"));
        assert_eq!(tree.child_topic_count(), 2);
        assert!(!tree.is_merge_in_flight());
    }

    #[test]
    fn test_empty_drain_leaves_tree_unchanged() {
        let bus = Arc::new(EventBus::new());
        let mut tree = connected(&bus);
        bus.publish("conn", text("a", "1"));
        tree.apply_unmerged_changes();
        let len = tree.len();

        assert_eq!(tree.apply_unmerged_changes(), 0);
        assert_eq!(tree.len(), len);
        assert_eq!(tree.message_at("a").unwrap().payload_text(), Some("1"));
    }

    #[test]
    fn test_pause_keeps_buffering() {
        let bus = Arc::new(EventBus::new());
        let mut tree = connected(&bus);
        tree.pause();
        assert_eq!(tree.state(), TreeState::Paused);

        bus.publish("conn", text("a", "1"));
        assert!(!tree.tick());
        assert!(tree.is_empty());
        assert_eq!(tree.unmerged_changes().len(), 1);

        tree.resume();
        assert!(tree.tick());
        assert_eq!(tree.child_topic_count(), 1);
    }

    #[test]
    fn test_tick_skipped_while_merge_deferred() {
        let bus = Arc::new(EventBus::new());
        let config = EngineConfig {
            merge: crate::config::MergeConfig {
                defer_to_idle: true,
                idle_timeout_ms: 60_000,
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        let mut tree: Tree = Tree::with_config(&config);
        tree.update_with_connection(bus.clone(), "conn", None).unwrap();

        bus.publish("conn", text("a", "1"));
        assert!(!tree.tick());
        assert!(tree.is_merge_in_flight());
        // Second tick is a no-op while the first merge is pending
        assert!(!tree.tick());
        assert!(tree.is_empty());

        assert!(tree.run_idle());
        assert!(!tree.is_merge_in_flight());
        assert_eq!(tree.child_topic_count(), 1);
        assert!(!tree.run_idle());
    }

    #[test]
    fn test_idle_timeout_forces_merge() {
        let bus = Arc::new(EventBus::new());
        let config = EngineConfig {
            merge: crate::config::MergeConfig {
                defer_to_idle: true,
                idle_timeout_ms: 0,
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        let mut tree: Tree = Tree::with_config(&config);
        tree.update_with_connection(bus.clone(), "conn", None).unwrap();

        bus.publish("conn", text("a", "1"));
        tree.tick();
        assert!(tree.pump());
        assert_eq!(tree.child_topic_count(), 1);
    }

    #[test]
    fn test_pump_follows_cadence() {
        let bus = Arc::new(EventBus::new());
        let config = EngineConfig {
            merge: crate::config::MergeConfig {
                interval_ms: 5,
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        let mut tree: Tree = Tree::with_config(&config);
        tree.update_with_connection(bus.clone(), "conn", None).unwrap();
        bus.publish("conn", text("a", "1"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while tree.is_empty() && Instant::now() < deadline {
            tree.wait_and_pump(Duration::from_millis(50));
        }
        assert_eq!(tree.child_topic_count(), 1);
    }

    #[test]
    fn test_filter_drops_non_matching() {
        let bus = Arc::new(EventBus::new());
        let mut tree: Tree = Tree::new();
        let filter: NodeFilter = Arc::new(|path, _| path.starts_with("keep"));
        tree.update_with_connection(bus.clone(), "conn", Some(filter))
            .unwrap();

        bus.publish("conn", text("keep/a", "1"));
        bus.publish("conn", text("drop/b", "2"));
        assert_eq!(tree.apply_unmerged_changes(), 1);
        assert!(tree.find("keep/a").is_some());
        assert!(tree.find("drop").is_none());
    }

    #[test]
    fn test_empty_topic_is_dropped() {
        let mut tree: Tree = Tree::new();
        tree.receive(text("///", "x"));
        assert_eq!(tree.apply_unmerged_changes(), 0);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_stop_updating_returns_to_idle() {
        let bus = Arc::new(EventBus::new());
        let mut tree = connected(&bus);
        bus.publish("conn", text("a", "1"));
        tree.apply_unmerged_changes();

        tree.stop_updating();
        assert_eq!(tree.state(), TreeState::Idle);
        assert_eq!(bus.subscriber_count("conn"), 0);
        assert_eq!(bus.publish("conn", text("b", "2")), 0);
        assert!(tree.find("a").is_some());
    }

    #[test]
    fn test_destroy_is_terminal_and_idempotent() {
        let bus = Arc::new(EventBus::new());
        let mut tree = connected(&bus);
        let updates = tree.subscribe_updates();

        tree.destroy();
        tree.destroy();
        assert_eq!(tree.state(), TreeState::Destroyed);
        assert_eq!(bus.subscriber_count("conn"), 0);
        assert!(updates.recv_timeout(Duration::from_millis(10)).is_err());
        assert!(tree.update_with_connection(bus.clone(), "conn", None).is_err());
        assert!(!tree.tick());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        {
            let _tree = connected(&bus);
            assert_eq!(bus.subscriber_count("conn"), 1);
        }
        assert_eq!(bus.subscriber_count("conn"), 0);
    }

    #[test]
    fn test_set_preprocessor_applies_to_new_messages() {
        let mut tree: Tree = Tree::new();
        tree.receive(IncomingMessage::new("spBv1.0/g/NDEATH/n", None));
        tree.set_preprocessor(PreprocessorKind::NamespaceExpanding);
        tree.receive(IncomingMessage::new("spBv1.0/g/NDEATH/n", None));
        tree.apply_unmerged_changes();

        assert!(tree.find("spBv1.0/g/NDEATH/n").is_some());
        assert!(tree.find("g").is_some());
        assert_eq!(tree.preprocessor_kind(), PreprocessorKind::NamespaceExpanding);
    }

    #[test]
    fn test_update_channel_signals_batches() {
        let mut tree: Tree = Tree::new();
        let rx = tree.subscribe_updates();
        tree.receive(text("a", "1"));
        tree.apply_unmerged_changes();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_buffer_limit_from_config() {
        let config = EngineConfig {
            buffer: crate::config::BufferConfig {
                max_messages: Some(2),
            },
            ..EngineConfig::default()
        };
        let mut tree: Tree = Tree::with_config(&config);
        for i in 0..5 {
            tree.receive(text(&format!("t/{}", i), "x"));
        }
        assert_eq!(tree.unmerged_changes().dropped(), 3);
        assert_eq!(tree.apply_unmerged_changes(), 2);
        assert!(tree.find("t/4").is_some());
        assert!(tree.find("t/0").is_none());
    }
}
