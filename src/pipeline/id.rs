//! Identity types for the pipeline system.
//!
//! `NodeId` is a newtype over `u32` that serves as a direct array index
//! into the topic tree arena, providing O(1) lookup. Subscription and
//! listener ids are opaque handles handed out by their registries.

use std::fmt;

/// Index into `TopicTree::nodes`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const INVALID: NodeId = NodeId(u32::MAX);
    /// The namespace root of every topic tree.
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "NodeId(INVALID)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Handle returned by an `EventSource` subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle for a registered update listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Per-instance identity stamp of a tree.
///
/// Randomly generated once at construction and never changed. It is a cheap
/// identity/memoization key, not a content hash: mutating the tree does not
/// change it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeIdentity(u64);

impl TreeIdentity {
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TreeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeIdentity({:016x})", self.0)
    }
}

impl fmt::Display for TreeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!NodeId::INVALID.is_valid());
        assert_eq!(NodeId::ROOT.index(), 0);
    }

    #[test]
    fn test_node_id_debug() {
        assert_eq!(format!("{:?}", NodeId(3)), "NodeId(3)");
        assert_eq!(format!("{}", NodeId::INVALID), "NodeId(INVALID)");
    }

    #[test]
    fn test_tree_identity_is_random() {
        let a = TreeIdentity::generate();
        let b = TreeIdentity::generate();
        // 64 random bits; a collision here means the generator is broken
        assert_ne!(a, b);
        assert_eq!(format!("{}", a).len(), 16);
    }
}
