//! Tree-walk merge of statements into effective ACL maps
//!
//! Every entry written to the [`AclCache`] under key `K` is the full effective
//! ACL of node `K`. A node without statements of its own is never cached: it
//! borrows the inheritable part of its parent's entry. A walk cut short by an
//! ancestor that could not be loaded is answered but never cached.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::AclCache;
use crate::effective::EffectiveAcl;
use crate::node::ReferencedObject;
use crate::statement::AccessControlStatement;

/// Result of resolving a node's effective ACL
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub acl: Arc<EffectiveAcl>,

    /// Whether the ACL came straight from the cache without walking
    pub cache_hit: bool,

    /// Ancestors whose statements were read from the tree
    pub walked: usize,
}

/// Accumulates statements closest first
#[derive(Debug, Default)]
pub struct AclBuilder {
    controlling_key: Option<String>,
    entries: HashMap<String, Vec<AccessControlStatement>>,
    dependencies: Vec<String>,
    incomplete: bool,
}

impl AclBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append statements contributed by `key`; the first contributor controls
    pub fn append(&mut self, key: &str, statements: &[AccessControlStatement]) {
        if statements.is_empty() {
            return;
        }
        if self.controlling_key.is_none() {
            self.controlling_key = Some(key.to_string());
        }
        for statement in statements {
            self.entries
                .entry(statement.key().to_string())
                .or_default()
                .push(statement.clone());
        }
    }

    /// Append a merged map after everything accumulated so far
    pub fn append_acl(&mut self, acl: &EffectiveAcl) {
        if acl.is_empty() {
            return;
        }
        if self.controlling_key.is_none() {
            self.controlling_key = acl.controlling_key().map(str::to_string);
        }
        for (key, statements) in acl.entries() {
            self.entries
                .entry(key.clone())
                .or_default()
                .extend(statements.iter().cloned());
        }
    }

    /// Record that the result was shaped by node `key`
    pub fn depend_on(&mut self, key: &str) {
        if !self.dependencies.iter().any(|d| d == key) {
            self.dependencies.push(key.to_string());
        }
    }

    /// Record that an ancestor's statements could not be read
    pub fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> EffectiveAcl {
        let acl = EffectiveAcl::from_parts(self.controlling_key, self.entries, self.dependencies);
        if self.incomplete {
            acl.into_incomplete()
        } else {
            acl
        }
    }
}

/// Effective ACL of `node`, served from or written to `cache`
pub fn resolve(node: &Arc<dyn ReferencedObject>, cache: &AclCache) -> MergeOutcome {
    if let Some(acl) = cache.get(node.key()) {
        return MergeOutcome {
            acl,
            cache_hit: true,
            walked: 0,
        };
    }

    if !node.own_statements().is_empty() {
        let (acl, walked) = build_full(node, cache);
        let acl = Arc::new(acl);
        cache_if_complete(cache, node.key(), &acl);
        return MergeOutcome {
            acl,
            cache_hit: false,
            walked,
        };
    }

    // No own statements: the parent, if it passes anything down, controls.
    let parent = match node.parent() {
        Some(parent) if !node.is_root() => parent,
        _ => {
            debug!(key = node.key(), "No statements up to root");
            return MergeOutcome {
                acl: Arc::new(EffectiveAcl::empty()),
                cache_hit: false,
                walked: 0,
            };
        }
    };

    if let Some(parent_acl) = cache.get(parent.key()) {
        return MergeOutcome {
            acl: parent_acl.inheritable(),
            cache_hit: true,
            walked: 0,
        };
    }

    let (parent_acl, walked) = build_full(&parent, cache);
    let parent_acl = Arc::new(parent_acl);
    cache_if_complete(cache, parent.key(), &parent_acl);

    MergeOutcome {
        acl: parent_acl.inheritable(),
        cache_hit: false,
        walked: walked + 1,
    }
}

fn cache_if_complete(cache: &AclCache, key: &str, acl: &Arc<EffectiveAcl>) {
    if acl.is_complete() {
        cache.put(key, Arc::clone(acl));
    } else {
        warn!(key, "Ancestor unavailable; merged ACL not cached");
    }
}

/// Full effective ACL of a node carrying statements of its own
///
/// Walks upward until the current node is a root or an ancestor's entry is
/// found in the cache. Returns the map and the number of ancestors read.
fn build_full(node: &Arc<dyn ReferencedObject>, cache: &AclCache) -> (EffectiveAcl, usize) {
    let mut builder = AclBuilder::new();
    builder.append(node.key(), node.own_statements());

    let mut walked = 0;
    let mut current = Arc::clone(node);

    loop {
        let parent = match current.parent() {
            Some(parent) if !current.is_root() => parent,
            Some(boundary) => {
                // inherits nothing from here, but would if the boundary changed
                builder.depend_on(boundary.key());
                break;
            }
            None => {
                if current.parent_unavailable() {
                    builder.mark_incomplete();
                }
                break;
            }
        };

        builder.depend_on(parent.key());

        if let Some(cached) = cache.get(parent.key()) {
            debug!(key = node.key(), ancestor = parent.key(), "Adopting cached ancestor ACL");
            builder.append_acl(&cached.inheritable());
            for dependency in cached.dependencies() {
                builder.depend_on(dependency);
            }
            break;
        }

        walked += 1;
        builder.append(parent.key(), parent.inheritable_statements());
        current = parent;
    }

    debug!(key = node.key(), walked, "Merged effective ACL");
    (builder.build(), walked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::node::StatementSet;
    use crate::statement::SubjectStatement;

    #[derive(Debug)]
    struct StubNode {
        key: String,
        statements: StatementSet,
        parent: Option<Arc<dyn ReferencedObject>>,
        parent_unavailable: bool,
    }

    impl ReferencedObject for StubNode {
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
            self.parent.clone()
        }

        fn parent_unavailable(&self) -> bool {
            self.parent_unavailable
        }
    }

    fn node(
        key: &str,
        statements: Vec<AccessControlStatement>,
        parent: Option<Arc<dyn ReferencedObject>>,
    ) -> Arc<dyn ReferencedObject> {
        Arc::new(StubNode {
            key: key.to_string(),
            statements: StatementSet::new(statements),
            parent,
            parent_unavailable: false,
        })
    }

    fn grant(key: &str, subject: SubjectStatement, propagating: bool) -> AccessControlStatement {
        AccessControlStatement::new(key, subject, true, propagating)
    }

    fn deny(key: &str, subject: SubjectStatement, propagating: bool) -> AccessControlStatement {
        AccessControlStatement::new(key, subject, false, propagating)
    }

    #[test]
    fn test_own_statements_come_first() {
        let cache = AclCache::new(CacheConfig::default());
        let root = node("/", vec![], None);
        let a = node("/a", vec![deny("read", SubjectStatement::group("g1", ""), true)], Some(root));
        let b = node("/a/b", vec![grant("read", SubjectStatement::user("bob"), false)], Some(a));

        let outcome = resolve(&b, &cache);
        let read = outcome.acl.statements("read");

        assert_eq!(read.len(), 2);
        assert!(read[0].is_granted());
        assert!(!read[1].is_granted());
        assert_eq!(outcome.acl.controlling_key(), Some("/a/b"));
        assert_eq!(outcome.walked, 1);
        assert!(cache.get("/a/b").is_some());
    }

    #[test]
    fn test_node_without_statements_borrows_parent() {
        let cache = AclCache::new(CacheConfig::default());
        let root = node("/", vec![], None);
        let a = node(
            "/a",
            vec![
                grant("read", SubjectStatement::anon(), true),
                grant("write", SubjectStatement::anon(), false),
            ],
            Some(root),
        );
        let c = node("/a/c", vec![], Some(a));

        let outcome = resolve(&c, &cache);

        assert_eq!(outcome.acl.controlling_key(), Some("/a"));
        assert_eq!(outcome.acl.statements("read").len(), 1);
        assert!(outcome.acl.statements("write").is_empty());
        assert!(cache.get("/a/c").is_none());

        // the parent's full ACL is what got cached
        let cached = cache.get("/a").unwrap();
        assert_eq!(cached.statements("write").len(), 1);

        assert!(resolve(&c, &cache).cache_hit);
    }

    #[test]
    fn test_no_statements_anywhere() {
        let cache = AclCache::new(CacheConfig::default());
        let root = node("/", vec![], None);
        let a = node("/a", vec![], Some(root));
        let b = node("/a/b", vec![], Some(a));

        let outcome = resolve(&b, &cache);

        assert!(outcome.acl.is_empty());
        assert!(outcome.acl.controlling_key().is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_walk_stops_at_root_boundary() {
        let cache = AclCache::new(CacheConfig::default());
        let root = node("/", vec![grant("read", SubjectStatement::anon(), true)], None);
        let a = node("/a", vec![grant("write", SubjectStatement::anon(), false)], Some(root));
        let b = node("/a/b", vec![grant("delete", SubjectStatement::anon(), false)], Some(a));

        let outcome = resolve(&b, &cache);

        // /a passes nothing down, so /a/b is a root
        assert!(outcome.acl.statements("read").is_empty());
        assert!(outcome.acl.statements("write").is_empty());
        assert_eq!(outcome.acl.statements("delete").len(), 1);
        assert_eq!(outcome.acl.dependencies(), &["/a".to_string()]);
    }

    #[test]
    fn test_adopts_cached_ancestor() {
        let cache = AclCache::new(CacheConfig::default());
        let root = node("/", vec![grant("read", SubjectStatement::anon(), true)], None);
        let a = node("/a", vec![grant("read", SubjectStatement::user("alice"), true)], Some(root));
        let b = node("/a/b", vec![deny("read", SubjectStatement::user("bob"), false)], Some(a.clone()));

        resolve(&a, &cache);
        let outcome = resolve(&b, &cache);

        assert_eq!(outcome.walked, 0);
        let read = outcome.acl.statements("read");
        assert_eq!(read.len(), 3);
        assert_eq!(read[0].subject(), &SubjectStatement::user("bob"));
        assert_eq!(read[1].subject(), &SubjectStatement::user("alice"));
        assert_eq!(read[2].subject(), &SubjectStatement::anon());

        let deps = outcome.acl.dependencies();
        assert!(deps.contains(&"/a".to_string()));
        assert!(deps.contains(&"/".to_string()));
    }

    #[test]
    fn test_unreadable_ancestor_is_not_cached() {
        let cache = AclCache::new(CacheConfig::default());
        let a: Arc<dyn ReferencedObject> = Arc::new(StubNode {
            key: "/a".to_string(),
            statements: StatementSet::new(vec![grant("write", SubjectStatement::anon(), true)]),
            parent: None,
            parent_unavailable: true,
        });
        let b = node("/a/b", vec![grant("read", SubjectStatement::anon(), false)], Some(a.clone()));
        let c = node("/a/c", vec![], Some(a));

        let outcome = resolve(&b, &cache);
        assert!(!outcome.acl.is_complete());
        assert_eq!(outcome.acl.statements("write").len(), 1);

        let outcome = resolve(&c, &cache);
        assert!(!outcome.acl.is_complete());
        assert!(!outcome.cache_hit);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_builder_ignores_empty_contributors() {
        let mut builder = AclBuilder::new();
        builder.append("/a/b", &[]);
        builder.append("/a", &[grant("read", SubjectStatement::anon(), true)]);
        builder.depend_on("/a");
        builder.depend_on("/a");

        assert!(!builder.is_empty());
        let acl = builder.build();
        assert_eq!(acl.controlling_key(), Some("/a"));
        assert_eq!(acl.dependencies().len(), 1);
    }
}
