//! Hierarchical topic tree.
//!
//! Topics are stored in a flat `Vec<TopicNode>` indexed by `NodeId`. Children
//! are keyed by segment name; the parent link is a plain index and never
//! owns anything, so teardown is a linear sweep independent of the links.
//!
//! ```text
//! (root)
//! +-- home
//! |   +-- kitchen
//! |       +-- temp        "21.5"
//! |       +-- humidity    "40"
//! +-- plant
//!     +-- line1
//!         +-- rpm         {"name":"rpm","value":1200}
//! ```
//!
//! Only nodes that have received a message are *topics*; the rest are path
//! structure. A detached `TopicTree` also serves as a merge fragment: a
//! message becomes a one-path-deep fragment via [`TopicTree::from_message`]
//! and is folded into a live tree with [`TopicTree::update_with_node`].

use crate::pipeline::id::NodeId;
use crate::types::{Message, TopicPath};
use std::collections::{HashMap, VecDeque};

/// Default number of previous messages kept per topic.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Caller-supplied per-node state with an explicit release hook.
///
/// `destroy` is called exactly once, when the node's view model is replaced
/// or when the owning tree is torn down.
pub trait ViewModel {
    fn destroy(&mut self) {}
}

impl ViewModel for () {}

/// A single segment of the topic namespace.
#[derive(Debug)]
pub struct TopicNode<V> {
    pub id: NodeId,
    /// Segment name, empty for the namespace root.
    pub name: String,
    /// Parent node (NodeId::INVALID for the root).
    pub parent: NodeId,
    children: HashMap<String, NodeId>,
    message: Option<Message>,
    /// Previous messages, oldest first.
    history: VecDeque<Message>,
    message_count: u64,
    view_model: Option<V>,
}

impl<V> TopicNode<V> {
    fn new(id: NodeId, name: String, parent: NodeId) -> Self {
        Self {
            id,
            name,
            parent,
            children: HashMap::new(),
            message: None,
            history: VecDeque::new(),
            message_count: 0,
            view_model: None,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// True if this node is an addressable topic rather than path structure.
    pub fn has_message(&self) -> bool {
        self.message.is_some()
    }

    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    /// Messages received on this exact topic since the node was created.
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn view_model(&self) -> Option<&V> {
        self.view_model.as_ref()
    }

    pub fn view_model_mut(&mut self) -> Option<&mut V> {
        self.view_model.as_mut()
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena-backed topic tree.
#[derive(Debug)]
pub struct TopicTree<V: ViewModel = ()> {
    nodes: Vec<TopicNode<V>>,
    history_capacity: usize,
}

impl<V: ViewModel> Default for TopicTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ViewModel> TopicTree<V> {
    /// Empty tree holding only the namespace root.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            nodes: vec![TopicNode::new(NodeId::ROOT, String::new(), NodeId::INVALID)],
            history_capacity,
        }
    }

    /// One-path-deep fragment carrying `message` at its topic.
    ///
    /// Returns `None` when the topic has no segments.
    pub fn from_message(message: Message) -> Option<Self> {
        let path = message.path();
        if path.is_empty() {
            return None;
        }
        let mut leaf = Self::new();
        leaf.set_message(NodeId::ROOT, message);
        let mut fragment = Self::new();
        fragment.insert_at_path(&path, leaf);
        Some(fragment)
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Total number of nodes, including the root and path-structure nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds only its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Get a node by NodeId (O(1) array index).
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&TopicNode<V>> {
        if id.is_valid() {
            self.nodes.get(id.index())
        } else {
            None
        }
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TopicNode<V>> {
        if id.is_valid() {
            self.nodes.get_mut(id.index())
        } else {
            None
        }
    }

    /// Look up a node by topic string.
    pub fn find(&self, topic: &str) -> Option<NodeId> {
        self.find_path(&TopicPath::parse(topic))
    }

    pub fn find_path(&self, path: &TopicPath) -> Option<NodeId> {
        path.iter()
            .try_fold(NodeId::ROOT, |id, segment| self.get(id)?.child(segment))
    }

    /// Message stored at `topic`, if any.
    pub fn message_at(&self, topic: &str) -> Option<&Message> {
        self.find(topic).and_then(|id| self.get(id)?.message())
    }

    /// Full topic string from the root to `id`.
    pub fn path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(node) = self.get(current) {
            if !node.name.is_empty() {
                segments.push(node.name.as_str());
            }
            current = node.parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Walk/create nodes along `path` and graft `subtree` at the end.
    ///
    /// The subtree's root content lands on the terminal node; its children
    /// become the terminal node's children. Returns the terminal node.
    pub fn insert_at_path(&mut self, path: &TopicPath, mut subtree: TopicTree<V>) -> NodeId {
        let terminal = path
            .iter()
            .fold(NodeId::ROOT, |id, segment| self.child_or_insert(id, segment));
        self.merge_node(terminal, &mut subtree, NodeId::ROOT);
        terminal
    }

    /// Merge another tree into this one, root to root.
    ///
    /// Existing nodes keep their children and get the incoming message and
    /// view model (when the incoming node carries them); missing nodes are
    /// grafted in.
    pub fn update_with_node(&mut self, mut other: TopicTree<V>) {
        self.merge_node(NodeId::ROOT, &mut other, NodeId::ROOT);
    }

    fn merge_node(&mut self, target: NodeId, source: &mut TopicTree<V>, from: NodeId) {
        let (message, view_model, children) = {
            let node = &mut source.nodes[from.index()];
            let children: Vec<(String, NodeId)> = node
                .children
                .iter()
                .map(|(name, id)| (name.clone(), *id))
                .collect();
            (node.message.take(), node.view_model.take(), children)
        };

        if let Some(message) = message {
            self.set_message(target, message);
        }
        if let Some(view_model) = view_model {
            self.set_view_model(target, view_model);
        }
        for (name, child) in children {
            let next = self.child_or_insert(target, &name);
            self.merge_node(next, source, child);
        }
    }

    /// Store `message` on a node, pushing the previous one into its history.
    pub fn set_message(&mut self, id: NodeId, message: Message) {
        let capacity = self.history_capacity;
        let Some(node) = self.get_mut(id) else {
            return;
        };
        if let Some(previous) = node.message.replace(message) {
            if capacity > 0 {
                if node.history.len() >= capacity {
                    node.history.pop_front();
                }
                node.history.push_back(previous);
            }
        }
        node.message_count += 1;
    }

    /// Attach a view model, destroying the one it replaces.
    pub fn set_view_model(&mut self, id: NodeId, view_model: V) {
        if let Some(node) = self.get_mut(id) {
            if let Some(mut old) = node.view_model.replace(view_model) {
                old.destroy();
            }
        }
    }

    fn child_or_insert(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(existing) = self.nodes[parent.index()].child(name) {
            return existing;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TopicNode::new(id, name.to_string(), parent));
        self.nodes[parent.index()]
            .children
            .insert(name.to_string(), id);
        id
    }

    /// Deep copy of the subtree at `id` with no live wiring.
    ///
    /// The clone's root carries the copied node's name and message. View
    /// models are not copied.
    pub fn unconnected_clone(&self, id: NodeId) -> TopicTree<V> {
        let mut clone = TopicTree::with_history_capacity(self.history_capacity);
        if let Some(node) = self.get(id) {
            clone.nodes[0].name = node.name.clone();
            self.copy_into(id, &mut clone, NodeId::ROOT);
        }
        clone
    }

    fn copy_into(&self, from: NodeId, clone: &mut TopicTree<V>, to: NodeId) {
        let node = &self.nodes[from.index()];
        clone.nodes[to.index()].message = node.message.clone();
        for (name, &child) in &node.children {
            let next = clone.child_or_insert(to, name);
            self.copy_into(child, clone, next);
        }
    }

    /// All topic-carrying descendants of the root.
    ///
    /// Lazy and restartable: each call walks the tree afresh.
    pub fn child_topics(&self) -> TopicIter<'_, V> {
        self.descendant_topics(NodeId::ROOT)
    }

    /// All topic-carrying descendants of `id`, excluding `id` itself.
    pub fn descendant_topics(&self, id: NodeId) -> TopicIter<'_, V> {
        let stack: Vec<NodeId> = self
            .get(id)
            .map(|n| n.children().collect())
            .unwrap_or_default();
        TopicIter { tree: self, stack }
    }

    pub fn child_topic_count(&self) -> usize {
        self.child_topics().count()
    }

    /// Children of `id` sorted by segment name.
    pub fn sorted_children(&self, id: NodeId) -> Vec<&TopicNode<V>> {
        let mut children: Vec<_> = self
            .get(id)
            .map(|n| n.children().filter_map(|c| self.get(c)).collect())
            .unwrap_or_default();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    /// Release every view model, parents before children.
    pub fn destroy_view_models(&mut self) {
        // Arena order is creation order, so parents precede their children.
        for node in &mut self.nodes {
            if let Some(mut view_model) = node.view_model.take() {
                view_model.destroy();
            }
        }
    }
}

impl<V: ViewModel> Drop for TopicTree<V> {
    fn drop(&mut self) {
        self.destroy_view_models();
    }
}

/// Depth-first iterator over topic-carrying nodes.
pub struct TopicIter<'a, V: ViewModel> {
    tree: &'a TopicTree<V>,
    stack: Vec<NodeId>,
}

impl<'a, V: ViewModel> Iterator for TopicIter<'a, V> {
    type Item = &'a TopicNode<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        while let Some(id) = self.stack.pop() {
            let node = &tree.nodes[id.index()];
            self.stack.extend(node.children());
            if node.has_message() {
                return Some(node);
            }
        }
        None
    }
}
