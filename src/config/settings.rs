//! Session settings that can be modified while a tree is live
//!
//! These are the user-facing preferences that influence a running tree,
//! separate from the engine configuration loaded at startup. Storing them
//! is left to the host application.
//!
//! # Main Types
//!
//! - [`SessionSettings`] - namespace parsing, topic filter and value rendering

use crate::error::Result;
use crate::payload::PayloadFormat;
use crate::pipeline::filter::{filter_tree, FilteredTree};
use crate::pipeline::preprocessor::PreprocessorKind;
use crate::pipeline::topic_tree::ViewModel;
use crate::pipeline::tree::Tree;
use serde::{Deserialize, Serialize};

/// Runtime preferences for the displayed tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Expand Sparkplug B namespaces and fan out their metrics
    #[serde(default)]
    pub parse_sparkplug_namespace: bool,

    /// Current topic filter (empty = show the whole tree)
    #[serde(default)]
    pub topic_filter: String,

    /// How payload values are rendered
    #[serde(default)]
    pub payload_format: PayloadFormat,
}

impl SessionSettings {
    /// Create new session settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Preprocessor matching the namespace parsing preference
    pub fn preprocessor_kind(&self) -> PreprocessorKind {
        if self.parse_sparkplug_namespace {
            PreprocessorKind::NamespaceExpanding
        } else {
            PreprocessorKind::None
        }
    }

    /// Install the preferred preprocessor on `tree`
    pub fn apply_preprocessor<V: ViewModel>(&self, tree: &mut Tree<V>) {
        let kind = self.preprocessor_kind();
        if tree.preprocessor_kind() != kind {
            tree.set_preprocessor(kind);
        }
    }

    /// Flip namespace parsing and apply it to `tree`
    pub fn toggle_namespace_parsing<V: ViewModel>(&mut self, tree: &mut Tree<V>) {
        self.parse_sparkplug_namespace = !self.parse_sparkplug_namespace;
        self.apply_preprocessor(tree);
    }

    /// Store `filter` and derive the tree to display from `tree`
    pub fn set_topic_filter<'a, V: ViewModel>(
        &mut self,
        tree: &'a mut Tree<V>,
        filter: &str,
    ) -> Result<FilteredTree<'a, V>> {
        self.topic_filter = filter.to_string();
        self.apply_preprocessor(tree);
        filter_tree(tree, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IncomingMessage;

    #[test]
    fn test_defaults() {
        let settings = SessionSettings::new();
        assert!(!settings.parse_sparkplug_namespace);
        assert!(settings.topic_filter.is_empty());
        assert_eq!(settings.payload_format, PayloadFormat::Raw);
        assert_eq!(settings.preprocessor_kind(), PreprocessorKind::None);
    }

    #[test]
    fn test_toggle_namespace_parsing() {
        let mut settings = SessionSettings::new();
        let mut tree: Tree = Tree::new();

        settings.toggle_namespace_parsing(&mut tree);
        assert_eq!(tree.preprocessor_kind(), PreprocessorKind::NamespaceExpanding);

        settings.toggle_namespace_parsing(&mut tree);
        assert_eq!(tree.preprocessor_kind(), PreprocessorKind::None);
    }

    #[test]
    fn test_set_topic_filter() {
        let mut settings = SessionSettings::new();
        let mut tree: Tree = Tree::new();
        tree.receive(IncomingMessage::new("a/b", Some(b"1".to_vec())));
        tree.receive(IncomingMessage::new("c/d", Some(b"2".to_vec())));
        tree.apply_unmerged_changes();

        let filtered = settings.set_topic_filter(&mut tree, "b").unwrap();
        assert_eq!(filtered.child_topic_count(), 1);
        drop(filtered);
        assert_eq!(settings.topic_filter, "b");

        let filtered = settings.set_topic_filter(&mut tree, "").unwrap();
        assert!(filtered.is_source());
    }

    #[test]
    fn test_serde_partial() {
        let settings: SessionSettings =
            serde_json::from_str(r#"{"parse_sparkplug_namespace": true}"#).unwrap();
        assert!(settings.parse_sparkplug_namespace);
        assert_eq!(settings.payload_format, PayloadFormat::Raw);
    }
}
