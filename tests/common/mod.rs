//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod sparkplug;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use topic_tree::{EventBus, Tree, ViewModel};

/// Connection id used by the integration tests
pub const CONNECTION: &str = "test-conn";

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Bus plus a tree subscribed to [`CONNECTION`] on it
pub fn live_tree() -> (Arc<EventBus>, Tree) {
    let bus = Arc::new(EventBus::new());
    let mut tree: Tree = Tree::new();
    tree.update_with_connection(bus.clone(), CONNECTION, None)
        .expect("fresh tree accepts a connection");
    (bus, tree)
}

/// Full paths of every topic in `tree`
pub fn topic_set<V: ViewModel>(tree: &Tree<V>) -> BTreeSet<String> {
    tree.child_topics().map(|n| tree.path(n.id)).collect()
}

/// Payload text stored at `topic`
pub fn text_at<'a, V: ViewModel>(tree: &'a Tree<V>, topic: &str) -> Option<&'a str> {
    tree.message_at(topic).and_then(|m| m.payload_text())
}
