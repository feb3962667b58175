//! Resource tree view
//!
//! The engine never owns the resource tree. A [`ReferenceResolver`] hands out
//! a fresh [`ReferencedObject`] per resolution; parents are reached through
//! the object itself so an implementation may load them lazily.

mod tree;

pub use tree::{
    normalize_path, parent_path, qualify_key, MemoryTree, NodeRecord, NodeStore, TreeNode,
    TreeReferenceResolver,
};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::statement::AccessControlStatement;

/// View of one node of the resource tree
pub trait ReferencedObject: Send + Sync + fmt::Debug {
    /// Unique, stable resource identifier
    fn key(&self) -> &str;

    /// Statements attached to this node
    fn own_statements(&self) -> &[AccessControlStatement];

    /// Own statements that propagate to descendants
    fn inheritable_statements(&self) -> &[AccessControlStatement];

    fn parent(&self) -> Option<Arc<dyn ReferencedObject>>;

    /// Whether the parent exists but could not be loaded
    ///
    /// An ACL merged through such a node is incomplete and must not be cached.
    fn parent_unavailable(&self) -> bool {
        false
    }

    /// Whether inheritance stops at this node
    ///
    /// A node is a root when it has no parent or its parent has nothing to
    /// pass down.
    fn is_root(&self) -> bool {
        self.parent()
            .map_or(true, |parent| parent.inheritable_statements().is_empty())
    }
}

/// Own statements of a node with the propagating subset precomputed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementSet {
    own: Vec<AccessControlStatement>,
    inheritable: Vec<AccessControlStatement>,
}

impl StatementSet {
    pub fn new(own: Vec<AccessControlStatement>) -> Self {
        let inheritable = own.iter().filter(|s| s.is_propagating()).cloned().collect();
        Self { own, inheritable }
    }

    pub fn own(&self) -> &[AccessControlStatement] {
        &self.own
    }

    pub fn inheritable(&self) -> &[AccessControlStatement] {
        &self.inheritable
    }

    pub fn is_empty(&self) -> bool {
        self.own.is_empty()
    }
}

/// Stand-in for a resource that could not be resolved
///
/// Has no statements and no parent, so every check against it is denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyObject {
    key: String,
}

impl EmptyObject {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl ReferencedObject for EmptyObject {
    fn key(&self) -> &str {
        &self.key
    }

    fn own_statements(&self) -> &[AccessControlStatement] {
        &[]
    }

    fn inheritable_statements(&self) -> &[AccessControlStatement] {
        &[]
    }

    fn parent(&self) -> Option<Arc<dyn ReferencedObject>> {
        None
    }

    fn is_root(&self) -> bool {
        true
    }
}

/// Turns a resource reference into a tree node
///
/// Implementations never fail: any lookup problem yields an [`EmptyObject`].
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Arc<dyn ReferencedObject>;
}

/// Receives notice that a node's stored ACL changed
pub trait AclChangeListener: Send + Sync {
    fn on_acl_changed(&self, key: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::SubjectStatement;

    #[test]
    fn test_statement_set_splits_inheritable() {
        let set = StatementSet::new(vec![
            AccessControlStatement::new("read", SubjectStatement::anon(), true, true),
            AccessControlStatement::new("write", SubjectStatement::anon(), true, false),
        ]);

        assert_eq!(set.own().len(), 2);
        assert_eq!(set.inheritable().len(), 1);
        assert_eq!(set.inheritable()[0].key(), "read");
    }

    #[test]
    fn test_empty_object_is_root() {
        let object = EmptyObject::new("/missing");
        assert_eq!(object.key(), "/missing");
        assert!(object.own_statements().is_empty());
        assert!(object.parent().is_none());
        assert!(object.is_root());
    }
}
