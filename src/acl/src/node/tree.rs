//! Path-addressed resource tree backed by a node store

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{AclChangeListener, EmptyObject, ReferenceResolver, ReferencedObject, StatementSet};
use crate::error::{AclError, Result};
use crate::statement::AccessControlStatement;

/// Stored form of a tree node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Raw ACL attribute, one JSON object per statement
    #[serde(default)]
    pub acl: Vec<serde_json::Value>,
}

/// Backing store for tree nodes
pub trait NodeStore: Send + Sync {
    /// Read a node by normalized path; `Ok(None)` when it does not exist
    fn read_node(&self, key: &str) -> Result<Option<NodeRecord>>;

    /// Prefix that makes this store's node keys distinct from other stores'
    ///
    /// Stores routed side by side under one resolver must each carry their own.
    fn namespace(&self) -> Option<&str> {
        None
    }
}

/// Resource key of `path` in a store with the given namespace
///
/// `content` and `/a/b` give `content:/a/b`; without a namespace the key is the path.
pub fn qualify_key(namespace: Option<&str>, path: &str) -> String {
    match namespace {
        Some(namespace) => format!("{}:{}", namespace, path),
        None => path.to_string(),
    }
}

/// Normalize a resource reference to an absolute `/`-separated path
///
/// Empty segments are collapsed; relative segments (`.`, `..`) are rejected.
pub fn normalize_path(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    let segments: Vec<&str> = reference.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return None;
    }

    Some(format!("/{}", segments.join("/")))
}

/// Parent of a normalized path; the root `/` has none
pub fn parent_path(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }

    path.rsplit_once('/').map(|(head, _)| {
        if head.is_empty() {
            "/".to_string()
        } else {
            head.to_string()
        }
    })
}

/// In-memory node store with change notification
///
/// Listeners are notified with qualified keys (see [`qualify_key`]).
pub struct MemoryTree {
    namespace: Option<String>,
    nodes: DashMap<String, NodeRecord>,
    listeners: DashMap<Uuid, Arc<dyn AclChangeListener>>,
}

impl MemoryTree {
    /// Create a tree holding only the root node
    pub fn new() -> Self {
        let nodes = DashMap::new();
        nodes.insert("/".to_string(), NodeRecord::default());

        Self {
            namespace: None,
            nodes,
            listeners: DashMap::new(),
        }
    }

    /// Create a tree whose node keys are prefixed with `namespace`
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::new()
        }
    }

    /// Create a node and any missing ancestors; returns the normalized key
    pub fn create_node(&self, path: &str) -> Result<String> {
        let key = normalize_path(path)
            .ok_or_else(|| AclError::Store(format!("invalid node path '{}'", path)))?;

        let mut prefix = String::new();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            self.nodes.entry(prefix.clone()).or_default();
        }

        Ok(key)
    }

    /// Replace a node's stored ACL attribute and notify listeners
    pub fn set_acl(&self, path: &str, acl: Vec<serde_json::Value>) -> Result<()> {
        let key = self.create_node(path)?;
        self.nodes.insert(key.clone(), NodeRecord { acl });
        debug!(key = %key, "Node ACL replaced");
        self.notify(&key);
        Ok(())
    }

    /// Replace a node's ACL with the given statements
    pub fn set_statements(&self, path: &str, statements: &[AccessControlStatement]) -> Result<()> {
        let acl = statements
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.set_acl(path, acl)
    }

    /// Remove a node and its subtree; returns the number of nodes removed
    pub fn remove_node(&self, path: &str) -> Result<usize> {
        let key = normalize_path(path)
            .ok_or_else(|| AclError::Store(format!("invalid node path '{}'", path)))?;
        if key == "/" {
            return Err(AclError::Store("the root node cannot be removed".to_string()));
        }

        let subtree_prefix = format!("{}/", key);
        let doomed: Vec<String> = self
            .nodes
            .iter()
            .filter(|node| node.key() == &key || node.key().starts_with(&subtree_prefix))
            .map(|node| node.key().clone())
            .collect();

        for doomed_key in &doomed {
            self.nodes.remove(doomed_key);
            self.notify(doomed_key);
        }

        Ok(doomed.len())
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize_path(path).map_or(false, |key| self.nodes.contains_key(&key))
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register a listener for ACL changes
    pub fn subscribe(&self, listener: Arc<dyn AclChangeListener>) -> Uuid {
        let id = Uuid::new_v4();
        self.listeners.insert(id, listener);
        id
    }

    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.listeners.remove(&id).is_some()
    }

    fn notify(&self, path: &str) {
        let key = qualify_key(self.namespace(), path);
        let listeners: Vec<_> = self
            .listeners
            .iter()
            .map(|listener| Arc::clone(listener.value()))
            .collect();

        for listener in listeners {
            listener.on_acl_changed(&key);
        }
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for MemoryTree {
    fn read_node(&self, key: &str) -> Result<Option<NodeRecord>> {
        Ok(self.nodes.get(key).map(|record| record.clone()))
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// Parent link of a [`TreeNode`], resolved on first use
enum ParentSlot {
    Loaded(Arc<dyn ReferencedObject>),
    Missing,
    /// The store failed while reading the parent
    Unavailable,
}

/// Tree node loaded from a [`NodeStore`]; the parent is loaded on first use
pub struct TreeNode {
    key: String,
    path: String,
    statements: StatementSet,
    store: Arc<dyn NodeStore>,
    parent: OnceLock<ParentSlot>,
}

impl TreeNode {
    /// Load the node stored under `path`
    ///
    /// Statements that cannot be parsed are dropped with a warning.
    pub fn load(store: &Arc<dyn NodeStore>, path: &str) -> Result<Option<Self>> {
        let Some(record) = store.read_node(path)? else {
            return Ok(None);
        };

        let key = qualify_key(store.namespace(), path);
        let (statements, dropped) = AccessControlStatement::parse_all(&record.acl);
        if dropped > 0 {
            warn!(key = %key, dropped, "Dropped malformed ACL statements");
        }

        Ok(Some(Self {
            key,
            path: path.to_string(),
            statements: StatementSet::new(statements),
            store: Arc::clone(store),
            parent: OnceLock::new(),
        }))
    }

    fn parent_slot(&self) -> &ParentSlot {
        self.parent.get_or_init(|| self.load_parent())
    }

    fn load_parent(&self) -> ParentSlot {
        let Some(path) = parent_path(&self.path) else {
            return ParentSlot::Missing;
        };

        match Self::load(&self.store, &path) {
            Ok(Some(parent)) => ParentSlot::Loaded(Arc::new(parent) as Arc<dyn ReferencedObject>),
            Ok(None) => ParentSlot::Missing,
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to load parent node");
                ParentSlot::Unavailable
            }
        }
    }
}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("statements", &self.statements)
            .finish_non_exhaustive()
    }
}

impl ReferencedObject for TreeNode {
    fn key(&self) -> &str {
        &self.key
    }

    fn own_statements(&self) -> &[AccessControlStatement] {
        self.statements.own()
    }

    fn inheritable_statements(&self) -> &[AccessControlStatement] {
        self.statements.inheritable()
    }

    fn parent(&self) -> Option<Arc<dyn ReferencedObject>> {
        match self.parent_slot() {
            ParentSlot::Loaded(parent) => Some(Arc::clone(parent)),
            ParentSlot::Missing | ParentSlot::Unavailable => None,
        }
    }

    fn parent_unavailable(&self) -> bool {
        matches!(self.parent_slot(), ParentSlot::Unavailable)
    }
}

/// Resolves path references against a [`NodeStore`]
pub struct TreeReferenceResolver {
    store: Arc<dyn NodeStore>,
}

impl TreeReferenceResolver {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReferenceResolver for TreeReferenceResolver {
    async fn resolve(&self, reference: &str) -> Arc<dyn ReferencedObject> {
        let Some(path) = normalize_path(reference) else {
            debug!(reference, "Unresolvable reference");
            return Arc::new(EmptyObject::new(reference));
        };

        match TreeNode::load(&self.store, &path) {
            Ok(Some(node)) => Arc::new(node) as Arc<dyn ReferencedObject>,
            Ok(None) => {
                debug!(path = %path, "Resource not found");
                Arc::new(EmptyObject::new(qualify_key(self.store.namespace(), &path)))
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to read resource");
                Arc::new(EmptyObject::new(qualify_key(self.store.namespace(), &path)))
            }
        }
    }
}
