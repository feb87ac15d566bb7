//! Topic filtering.
//!
//! A [`TopicFilter`] matches a topic when either:
//! - its full path contains the needle, ignoring case on both sides, or
//! - its payload text, lowercased, contains the needle *as typed*.
//!
//! The payload side only folds the haystack, so a needle with uppercase
//! letters can match paths but never payloads. Existing consumers depend on
//! this, so it is kept.
//!
//! [`filter_tree`] derives a new live tree holding every matching topic (with
//! its subtree) and wires it to the same source as the tree it came from, with the
//! filter applied to future messages.

use crate::error::Result;
use crate::pipeline::topic_tree::{TopicTree, ViewModel};
use crate::pipeline::tree::{NodeFilter, Tree};
use crate::types::{Message, TopicPath};
use std::ops::Deref;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    needle: String,
    needle_lower: String,
}

impl TopicFilter {
    pub fn new(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        let needle_lower = needle.to_lowercase();
        Self {
            needle,
            needle_lower,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.needle
    }

    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    pub fn matches_topic(&self, path: &str) -> bool {
        path.to_lowercase().contains(&self.needle_lower)
    }

    pub fn matches_message(&self, message: Option<&Message>) -> bool {
        message
            .and_then(|m| m.payload.as_ref())
            .is_some_and(|payload| payload.to_text().to_lowercase().contains(&self.needle))
    }

    pub fn matches(&self, path: &str, message: Option<&Message>) -> bool {
        self.matches_topic(path) || self.matches_message(message)
    }

    pub fn into_node_filter(self) -> NodeFilter {
        Arc::new(move |path, message| self.matches(path, message))
    }
}

/// Result of [`filter_tree`]: the source itself or a derived tree.
pub enum FilteredTree<'a, V: ViewModel = ()> {
    /// Empty filter; the caller keeps showing the source.
    Source(&'a Tree<V>),
    Derived(Tree<V>),
}

impl<'a, V: ViewModel> FilteredTree<'a, V> {
    pub fn is_source(&self) -> bool {
        matches!(self, FilteredTree::Source(_))
    }

    pub fn into_derived(self) -> Option<Tree<V>> {
        match self {
            FilteredTree::Source(_) => None,
            FilteredTree::Derived(tree) => Some(tree),
        }
    }
}

impl<'a, V: ViewModel> Deref for FilteredTree<'a, V> {
    type Target = Tree<V>;

    fn deref(&self) -> &Tree<V> {
        match self {
            FilteredTree::Source(tree) => *tree,
            FilteredTree::Derived(tree) => tree,
        }
    }
}

/// Build a tree of the topics in `source` matching `filter`.
///
/// An empty filter returns the source unchanged. Otherwise every matching
/// topic is cloned with its subtree and grafted at its original path in a
/// fresh tree. If `source` is live, the new tree subscribes to the same
/// connection and filters incoming messages the same way.
pub fn filter_tree<'a, V: ViewModel>(
    source: &'a Tree<V>,
    filter: &str,
) -> Result<FilteredTree<'a, V>> {
    if filter.is_empty() {
        return Ok(FilteredTree::Source(source));
    }

    let topic_filter = TopicFilter::new(filter);
    let mut result: Tree<V> = Tree::with_config(source.config());
    // Subtrees already grafted through a matching ancestor
    let mut covered: Vec<String> = Vec::new();

    for node in source.child_topics() {
        let path = source.path(node.id);
        if covered.iter().any(|prefix| is_descendant(&path, prefix)) {
            continue;
        }
        if !topic_filter.matches(&path, node.message()) {
            continue;
        }

        let clone = source.unconnected_clone(node.id);
        let mut fragment = TopicTree::with_history_capacity(source.history_capacity());
        fragment.insert_at_path(&TopicPath::parse(&path), clone);
        result.update_with_node(fragment);
        covered.push(path);
    }

    tracing::debug!(
        filter,
        matched = covered.len(),
        topics = result.child_topic_count(),
        "Filtered tree"
    );

    if let (Some(events), Some(connection_id)) = (source.source(), source.connection_id()) {
        result.update_with_connection(
            events.clone(),
            connection_id,
            Some(topic_filter.into_node_filter()),
        )?;
    }

    Ok(FilteredTree::Derived(result))
}

fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}
