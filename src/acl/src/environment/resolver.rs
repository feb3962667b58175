//! Environment resolution with per-principal caching

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Session, UserEnvironment};
use crate::cache::{Cache, CacheConfig, CacheScope, CacheStats, MemoryCache};
use crate::config::AclConfig;
use crate::error::{AclError, Result};

/// Resolves the environment of the principal behind a session
#[async_trait]
pub trait UserEnvironmentResolver: Send + Sync {
    /// Never fails: unknown or expired principals resolve to
    /// [`UserEnvironment::anonymous`]
    async fn resolve(&self, session: &Session) -> UserEnvironment;
}

/// Stored group memberships of a principal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    /// Group token -> permission tokens recorded for the membership
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
}

impl EnvironmentRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.entry(group.into()).or_default();
        self
    }

    pub fn with_group_permissions<I, S>(mut self, group: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .entry(group.into())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
        self
    }
}

/// Source of principal memberships (directory, database, ...)
#[async_trait]
pub trait EnvironmentSource: Send + Sync {
    /// `Ok(None)` when the principal is unknown
    async fn load(&self, principal_id: &str) -> Result<Option<EnvironmentRecord>>;
}

/// In-memory [`EnvironmentSource`]
#[derive(Default)]
pub struct MemoryEnvironmentSource {
    records: DashMap<String, EnvironmentRecord>,
}

impl MemoryEnvironmentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, principal_id: impl Into<String>, record: EnvironmentRecord) {
        self.records.insert(principal_id.into(), record);
    }

    pub fn remove(&self, principal_id: &str) -> Option<EnvironmentRecord> {
        self.records.remove(principal_id).map(|(_, record)| record)
    }
}

#[async_trait]
impl EnvironmentSource for MemoryEnvironmentSource {
    async fn load(&self, principal_id: &str) -> Result<Option<EnvironmentRecord>> {
        Ok(self.records.get(principal_id).map(|record| record.clone()))
    }
}

/// [`UserEnvironmentResolver`] that caches environments per principal
///
/// Loaded environments are stamped with `now + ttl`; an expired environment
/// is never reused and is reloaded from the source on the next resolution.
pub struct CachingEnvironmentResolver {
    source: Arc<dyn EnvironmentSource>,
    cache: MemoryCache<UserEnvironment>,
    ttl: chrono::Duration,
}

impl CachingEnvironmentResolver {
    pub fn new(source: Arc<dyn EnvironmentSource>, capacity: usize, ttl: Duration) -> Result<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AclError::Config(format!("environment ttl out of range: {}", e)))?;

        Ok(Self {
            source,
            cache: MemoryCache::new(
                CacheScope::Instance,
                CacheConfig {
                    capacity,
                    ttl: None,
                },
            ),
            ttl,
        })
    }

    /// Sized and stamped from the `[environment]` section
    pub fn from_config(source: Arc<dyn EnvironmentSource>, config: &AclConfig) -> Result<Self> {
        Self::new(source, config.environment.cache_capacity, config.environment_ttl())
    }

    /// Drop the cached environment of a principal
    pub fn evict(&self, principal_id: &str) -> bool {
        self.cache.remove(principal_id).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn load(&self, principal_id: &str) -> Option<UserEnvironment> {
        match self.source.load(principal_id).await {
            Ok(Some(record)) => {
                let mut environment = UserEnvironment::new(principal_id, Utc::now() + self.ttl);
                for (group, permissions) in record.groups {
                    environment = environment.with_group_permissions(group, permissions);
                }
                Some(environment)
            }
            Ok(None) => {
                debug!(principal_id, "Unknown principal");
                None
            }
            Err(e) => {
                warn!(principal_id, error = %e, "Failed to load principal environment");
                None
            }
        }
    }
}

#[async_trait]
impl UserEnvironmentResolver for CachingEnvironmentResolver {
    async fn resolve(&self, session: &Session) -> UserEnvironment {
        let Some(principal_id) = session.principal() else {
            return UserEnvironment::anonymous();
        };

        if let Some(environment) = self.cache.get(principal_id) {
            if !environment.has_expired() {
                return environment;
            }
            debug!(principal_id, "Cached environment expired");
            self.cache.remove(principal_id);
        }

        match self.load(principal_id).await {
            Some(environment) if !environment.has_expired() => {
                self.cache.put(principal_id, environment.clone());
                environment
            }
            _ => UserEnvironment::anonymous(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::SubjectStatement;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: MemoryEnvironmentSource,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl EnvironmentSource for CountingSource {
        async fn load(&self, principal_id: &str) -> Result<Option<EnvironmentRecord>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(principal_id).await
        }
    }

    struct FailingSource;

    #[async_trait]
    impl EnvironmentSource for FailingSource {
        async fn load(&self, _principal_id: &str) -> Result<Option<EnvironmentRecord>> {
            Err(AclError::Environment("directory unavailable".to_string()))
        }
    }

    fn counting_source() -> Arc<CountingSource> {
        let inner = MemoryEnvironmentSource::new();
        inner.insert(
            "bob",
            EnvironmentRecord::new()
                .with_group("g1")
                .with_group_permissions("editors", ["write"]),
        );
        Arc::new(CountingSource {
            inner,
            loads: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_resolves_and_caches() {
        let source = counting_source();
        let resolver = CachingEnvironmentResolver::new(source.clone(), 100, Duration::from_secs(60)).unwrap();
        let session = Session::new("s1", "bob");

        let env = resolver.resolve(&session).await;
        assert_eq!(env.principal_id(), Some("bob"));
        assert!(env.matches(&SubjectStatement::group("g1", "")));
        assert!(env.matches(&SubjectStatement::group("editors", "write")));

        resolver.resolve(&session).await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_environment_is_reloaded() {
        let source = counting_source();
        let resolver = CachingEnvironmentResolver::new(source.clone(), 100, Duration::from_millis(20)).unwrap();
        let session = Session::new("s1", "bob");

        resolver.resolve(&session).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let env = resolver.resolve(&session).await;

        assert_eq!(env.principal_id(), Some("bob"));
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_principal_is_anonymous() {
        let resolver = CachingEnvironmentResolver::new(counting_source(), 100, Duration::from_secs(60)).unwrap();

        let env = resolver.resolve(&Session::new("s1", "mallory")).await;
        assert!(env.is_anonymous());
        assert!(env.matches(&SubjectStatement::anon()));
        assert!(!env.matches(&SubjectStatement::authenticated()));
        assert!(!env.matches(&SubjectStatement::user("mallory")));
    }

    #[tokio::test]
    async fn test_anonymous_session_skips_source() {
        let source = counting_source();
        let resolver = CachingEnvironmentResolver::new(source.clone(), 100, Duration::from_secs(60)).unwrap();

        let env = resolver.resolve(&Session::anonymous("s1")).await;
        assert!(env.is_anonymous());
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_source_failure_is_anonymous() {
        let resolver = CachingEnvironmentResolver::new(Arc::new(FailingSource), 100, Duration::from_secs(60)).unwrap();

        let env = resolver.resolve(&Session::new("s1", "bob")).await;
        assert!(env.is_anonymous());
        assert!(!env.matches(&SubjectStatement::group("g1", "")));
    }

    #[tokio::test]
    async fn test_evict() {
        let source = counting_source();
        let resolver = CachingEnvironmentResolver::new(source.clone(), 100, Duration::from_secs(60)).unwrap();
        let session = Session::new("s1", "bob");

        resolver.resolve(&session).await;
        assert!(resolver.evict("bob"));
        resolver.resolve(&session).await;

        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
