//! Cluster-invalidated cache of merged ACL maps

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Cache, CacheConfig, CacheScope, CacheStats, MemoryCache};
use crate::effective::EffectiveAcl;
use crate::node::AclChangeListener;

/// Merged ACL maps keyed by controlling node
///
/// Each entry is the full effective ACL of the node named by its key. Entries
/// record which ancestors they were built from, so a change to one node evicts
/// that node's entry and every entry that embedded it.
pub struct AclCache {
    /// Entry storage (process memory or a cluster-backed implementation)
    entries: Arc<dyn Cache<Arc<EffectiveAcl>>>,

    /// Ancestor key -> cached keys built from it
    dependents: DashMap<String, HashSet<String>>,

    /// Cached key -> ancestors it is registered under in `dependents`
    sources: DashMap<String, Vec<String>>,

    invalidations: AtomicUsize,
}

impl AclCache {
    /// In-memory cache in the cluster-invalidated scope
    pub fn new(config: CacheConfig) -> Self {
        Self::with_backend(Arc::new(MemoryCache::new(
            CacheScope::ClusterInvalidated,
            config,
        )))
    }

    /// Use an externally provided cache for entry storage
    pub fn with_backend(entries: Arc<dyn Cache<Arc<EffectiveAcl>>>) -> Self {
        Self {
            entries,
            dependents: DashMap::new(),
            sources: DashMap::new(),
            invalidations: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<EffectiveAcl>> {
        let hit = self.entries.get(key);
        debug!(key, hit = hit.is_some(), "ACL cache lookup");
        hit
    }

    /// Store the effective ACL of node `key`, replacing any previous entry
    pub fn put(&self, key: &str, acl: Arc<EffectiveAcl>) {
        self.forget(key);
        for dependency in acl.dependencies() {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.sources
            .insert(key.to_string(), acl.dependencies().to_vec());

        self.entries.put(key, acl);

        // the backend dropped entries on its own (capacity or TTL)
        if self.sources.len() > self.entries.len() {
            self.prune();
        }
    }

    /// Evict `key` and every entry built from it; returns the number evicted
    pub fn invalidate(&self, key: &str) -> usize {
        let mut doomed = HashSet::from([key.to_string()]);
        if let Some((_, dependents)) = self.dependents.remove(key) {
            doomed.extend(dependents);
        }

        let mut evicted = 0;
        for doomed_key in &doomed {
            self.forget(doomed_key);
            if self.entries.remove(doomed_key).is_some() {
                evicted += 1;
            }
        }

        self.invalidations.fetch_add(1, Ordering::Relaxed);
        info!(key, evicted, "ACL cache invalidated");
        evicted
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.dependents.clear();
        self.sources.clear();
        info!("ACL cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of change notifications processed
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }

    pub fn scope(&self) -> CacheScope {
        self.entries.scope()
    }

    /// Unregister `key` from the dependency index
    fn forget(&self, key: &str) {
        let Some((_, dependencies)) = self.sources.remove(key) else {
            return;
        };

        for dependency in dependencies {
            if let Some(mut dependents) = self.dependents.get_mut(&dependency) {
                dependents.remove(key);
            }
            self.dependents.remove_if(&dependency, |_, dependents| dependents.is_empty());
        }
    }

    /// Drop index records of entries the backend no longer holds
    fn prune(&self) {
        let stale: Vec<String> = self
            .sources
            .iter()
            .filter(|source| !self.entries.contains_key(source.key()))
            .map(|source| source.key().clone())
            .collect();

        for key in &stale {
            self.forget(key);
        }
        debug!(pruned = stale.len(), "ACL dependency index pruned");
    }
}

impl AclChangeListener for AclCache {
    fn on_acl_changed(&self, key: &str) {
        self.invalidate(key);
    }
}
