//! Scoped caches
//!
//! The engine works against three cache lifetimes:
//!
//! - [`CacheScope::Request`]: boolean decisions for one inbound call, held by a
//!   [`RequestScope`] value that the request handler binds and releases.
//! - [`CacheScope::Instance`]: per-process data such as resolved environments.
//! - [`CacheScope::ClusterInvalidated`]: merged ACL maps shared across requests,
//!   evicted when a node's ACL changes ([`AclCache`]).

mod acl;
mod memory;
mod request;

pub use acl::AclCache;
pub use memory::MemoryCache;
pub use request::RequestScope;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifetime of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Cleared at the end of every request
    Request,
    /// Lives as long as the process
    Instance,
    /// Shared, explicitly invalidated on change
    ClusterInvalidated,
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Instance => write!(f, "instance"),
            Self::ClusterInvalidated => write!(f, "cluster_invalidated"),
        }
    }
}

/// Key-value cache bound to a scope
pub trait Cache<V>: Send + Sync {
    /// Scope this cache lives in
    fn scope(&self) -> CacheScope;

    fn get(&self, key: &str) -> Option<V>;

    /// Whether a live entry exists, without touching hit/miss counters
    fn contains_key(&self, key: &str) -> bool;

    /// Insert or fully replace the entry for `key`
    fn put(&self, key: &str, value: V);

    fn remove(&self, key: &str) -> Option<V>;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub capacity: usize,

    /// Time-to-live for entries, `None` keeps them until removed
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: None,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub evictions: usize,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
