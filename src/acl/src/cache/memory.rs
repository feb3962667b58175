//! In-memory scoped cache on DashMap with optional TTL

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{Cache, CacheConfig, CacheScope, CacheStats};

/// Cached entry with insertion time
#[derive(Clone)]
struct CachedEntry<V> {
    value: V,
    cached_at: Instant,
}

impl<V> CachedEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.map_or(false, |ttl| self.cached_at.elapsed() > ttl)
    }
}

/// Thread-safe in-memory cache
///
/// Provides:
/// - Lock-free concurrent access through DashMap
/// - Optional TTL-based expiration
/// - Oldest-first eviction once capacity is reached
/// - Hit/miss/expiration statistics
pub struct MemoryCache<V> {
    scope: CacheScope,

    entries: Arc<DashMap<String, CachedEntry<V>>>,

    config: CacheConfig,

    stats: Arc<DashMap<&'static str, usize>>,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(scope: CacheScope, config: CacheConfig) -> Self {
        debug!(
            "Creating {} cache (capacity={}, ttl={:?})",
            scope, config.capacity, config.ttl
        );

        Self {
            scope,
            entries: Arc::new(DashMap::new()),
            config,
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Remove entries that have outlived the TTL
    pub fn cleanup_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
        let removed = before.saturating_sub(self.entries.len());
        self.add_stat("expirations", removed);
        removed
    }

    /// Evict the oldest tenth of the entries
    fn evict_oldest(&self) {
        let to_remove = (self.config.capacity / 10).max(1);

        let mut ages: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().cached_at))
            .collect();
        ages.sort_by_key(|(_, cached_at)| *cached_at);

        for (key, _) in ages.into_iter().take(to_remove) {
            self.entries.remove(&key);
        }

        self.add_stat("evictions", to_remove);
    }

    fn increment_stat(&self, key: &'static str) {
        self.add_stat(key, 1);
    }

    fn add_stat(&self, key: &'static str, count: usize) {
        if count == 0 {
            return;
        }
        *self.stats.entry(key).or_insert(0) += count;
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn scope(&self) -> CacheScope {
        self.scope
    }

    fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.entries.remove(key);
                self.increment_stat("expirations");
                self.increment_stat("misses");
                return None;
            }

            self.increment_stat("hits");
            return Some(entry.value.clone());
        }

        self.increment_stat("misses");
        None
    }

    fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired(self.config.ttl))
    }

    fn put(&self, key: &str, value: V) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.config.capacity {
            self.evict_oldest();
        }

        self.entries.insert(key.to_string(), CachedEntry::new(value));
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    fn clear(&self) {
        self.entries.clear();
        self.stats.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            evictions: self.get_stat("evictions"),
            entries: self.entries.len(),
            capacity: self.config.capacity,
        }
    }
}
