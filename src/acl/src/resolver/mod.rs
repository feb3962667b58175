//! Permission check pipeline
//!
//! Orchestrates request-scope lookup, environment and node resolution, merged
//! ACL lookup or build, and first-match evaluation.

pub mod merge;
mod path;

pub use merge::{AclBuilder, MergeOutcome};
pub use path::{first_segment, PathReferenceResolver};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, DenialRecord};
use crate::cache::{AclCache, RequestScope};
use crate::config::AclConfig;
use crate::effective::EffectiveAcl;
use crate::environment::{Session, UserEnvironmentResolver};
use crate::error::{DenialReason, PermissionDenied, Result};
use crate::metrics::MetricsCollector;
use crate::node::{AclChangeListener, ReferenceResolver};
use crate::query::PermissionQuery;

/// Hierarchical ACL resolver
///
/// # Architecture
///
/// ```text
/// check → RequestScope → UserEnvironmentResolver ─┐
///              ↓                                   ↓
///         ReferenceResolver → AclCache / merge → decide → RequestScope
///                                                   ↓
///                                    [Audit Log]  [Metrics]
/// ```
pub struct AuthzResolver {
    references: Arc<dyn ReferenceResolver>,

    environments: Arc<dyn UserEnvironmentResolver>,

    /// Merged ACLs shared by all requests
    acl_cache: Arc<AclCache>,

    audit: Option<Arc<AuditLog>>,

    metrics: Option<Arc<MetricsCollector>>,
}

impl AuthzResolver {
    pub fn new(
        config: &AclConfig,
        references: Arc<dyn ReferenceResolver>,
        environments: Arc<dyn UserEnvironmentResolver>,
    ) -> Result<Self> {
        config.validate()?;

        let audit = config
            .audit
            .enabled
            .then(|| Arc::new(AuditLog::new(config.audit.capacity)));
        let metrics = config
            .metrics
            .enabled
            .then(|| Arc::new(MetricsCollector::new()));

        info!(
            acl_cache_capacity = config.acl_cache.capacity,
            audit = config.audit.enabled,
            metrics = config.metrics.enabled,
            "AuthzResolver initialized"
        );

        Ok(Self {
            references,
            environments,
            acl_cache: Arc::new(AclCache::new(config.acl_cache_config())),
            audit,
            metrics,
        })
    }

    /// Share an existing ACL cache, e.g. one wired to a cluster backend
    pub fn with_acl_cache(mut self, acl_cache: Arc<AclCache>) -> Self {
        self.acl_cache = acl_cache;
        self
    }

    /// Bind a request scope for `session`
    pub fn begin_request(&self, session: Session) -> RequestScope {
        let scope = RequestScope::new(session);
        debug!(request = %scope.id(), "Request scope bound");
        scope
    }

    /// Release a request scope; returns the number of decisions it held
    pub fn end_request(&self, scope: RequestScope) -> usize {
        let decisions = scope.len();
        debug!(
            request = %scope.id(),
            decisions,
            elapsed_ms = scope.elapsed().as_millis() as u64,
            "Request scope released"
        );
        decisions
    }

    /// Check `query` against `reference` for the scope's session
    ///
    /// Every outcome is recorded in the scope, so repeating a check within the
    /// same request returns the same answer without touching the tree.
    pub async fn check(
        &self,
        scope: &mut RequestScope,
        reference: &str,
        query: &PermissionQuery,
    ) -> std::result::Result<(), PermissionDenied> {
        let start = Instant::now();
        let local_key = query.key(reference);

        if let Some(granted) = scope.decision(&local_key) {
            debug!(reference, query = query.name(), granted, "Request cache hit");
            if let Some(metrics) = &self.metrics {
                metrics.record_request_cache(true).await;
            }
            self.finish(start, granted).await;

            return if granted {
                Ok(())
            } else {
                Err(PermissionDenied::new(reference, query.name(), DenialReason::CachedDenial))
            };
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_request_cache(false).await;
        }

        let environment = self.environments.resolve(scope.session()).await;
        let node = self.references.resolve(reference).await;
        let outcome = merge::resolve(&node, &self.acl_cache);

        if let Some(metrics) = &self.metrics {
            metrics.record_acl_cache(outcome.cache_hit).await;
            if !outcome.cache_hit {
                metrics.record_merge(outcome.walked).await;
            }
        }

        let reason = match outcome.acl.decide(query, &environment) {
            Some(statement) if statement.is_granted() => {
                debug!(reference, query = query.name(), %statement, "Granted");
                scope.record(local_key, true);
                self.finish(start, true).await;
                return Ok(());
            }
            Some(statement) => DenialReason::ExplicitDeny {
                statement: statement.clone(),
            },
            None => DenialReason::NoGrantFound,
        };

        scope.record(local_key, false);
        self.finish(start, false).await;

        let denial = PermissionDenied::new(reference, query.name(), reason);
        warn!(
            reference,
            query = query.name(),
            principal = environment.principal_id().unwrap_or("anonymous"),
            reason = %denial.reason,
            "Permission denied"
        );

        if let Some(audit) = &self.audit {
            audit
                .record(DenialRecord::from_denial(&denial, environment.principal_id()))
                .await;
        }

        Err(denial)
    }

    /// [`check`](Self::check) reduced to a boolean
    pub async fn is_granted(
        &self,
        scope: &mut RequestScope,
        reference: &str,
        query: &PermissionQuery,
    ) -> bool {
        self.check(scope, reference, query).await.is_ok()
    }

    /// Merged ACL for `reference`, through the same cache as checks
    pub async fn effective_acl(&self, reference: &str) -> Arc<EffectiveAcl> {
        let node = self.references.resolve(reference).await;
        merge::resolve(&node, &self.acl_cache).acl
    }

    /// Evict cached ACLs affected by a change to node `key`
    pub fn on_acl_changed(&self, key: &str) -> usize {
        self.acl_cache.invalidate(key)
    }

    pub fn acl_cache(&self) -> &Arc<AclCache> {
        &self.acl_cache
    }

    pub fn audit(&self) -> Option<&Arc<AuditLog>> {
        self.audit.as_ref()
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }

    /// Prometheus text export, `None` when metrics are disabled
    pub async fn export_prometheus(&self) -> Option<String> {
        match &self.metrics {
            Some(metrics) => Some(metrics.export_prometheus(self.acl_cache.invalidations()).await),
            None => None,
        }
    }

    async fn finish(&self, start: Instant, granted: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(granted).await;
            metrics.record_latency(start.elapsed()).await;
        }
    }
}

impl AclChangeListener for AuthzResolver {
    fn on_acl_changed(&self, key: &str) {
        self.acl_cache.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{CachingEnvironmentResolver, EnvironmentRecord, MemoryEnvironmentSource};
    use crate::node::{MemoryTree, TreeReferenceResolver};
    use crate::statement::{AccessControlStatement, SubjectStatement};
    use std::time::Duration;

    fn resolver(tree: Arc<MemoryTree>) -> AuthzResolver {
        let source = MemoryEnvironmentSource::new();
        source.insert("bob", EnvironmentRecord::new().with_group("g1"));
        let environments =
            CachingEnvironmentResolver::new(Arc::new(source), 100, Duration::from_secs(60)).unwrap();

        AuthzResolver::new(
            &AclConfig::default(),
            Arc::new(TreeReferenceResolver::new(tree)),
            Arc::new(environments),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_grant_is_recorded_in_scope() {
        let tree = Arc::new(MemoryTree::new());
        tree.set_statements(
            "/a",
            &[AccessControlStatement::new("read", SubjectStatement::user("bob"), true, false)],
        )
        .unwrap();
        let resolver = resolver(tree);
        let query = PermissionQuery::single("read");

        let mut scope = resolver.begin_request(Session::new("s1", "bob"));
        assert!(resolver.check(&mut scope, "/a", &query).await.is_ok());
        assert_eq!(scope.decision(&query.key("/a")), Some(true));
        assert_eq!(resolver.end_request(scope), 1);
    }

    #[tokio::test]
    async fn test_cached_denial_is_replayed() {
        let resolver = resolver(Arc::new(MemoryTree::new()));
        let query = PermissionQuery::single("read");
        let mut scope = resolver.begin_request(Session::new("s1", "bob"));

        let first = resolver.check(&mut scope, "/missing", &query).await.unwrap_err();
        assert_eq!(first.reason, DenialReason::NoGrantFound);

        let second = resolver.check(&mut scope, "/missing", &query).await.unwrap_err();
        assert_eq!(second.reason, DenialReason::CachedDenial);

        // only the first denial is audited
        assert_eq!(resolver.audit().unwrap().len().await, 1);
        let metrics = resolver.metrics().unwrap().get_metrics().await;
        assert_eq!(metrics.checks, 2);
        assert_eq!(metrics.request_cache_hits, 1);
    }

    #[tokio::test]
    async fn test_disabled_audit_and_metrics() {
        let mut config = AclConfig::default();
        config.audit.enabled = false;
        config.metrics.enabled = false;

        let environments = CachingEnvironmentResolver::new(
            Arc::new(MemoryEnvironmentSource::new()),
            10,
            Duration::from_secs(60),
        )
        .unwrap();
        let resolver = AuthzResolver::new(
            &config,
            Arc::new(TreeReferenceResolver::new(Arc::new(MemoryTree::new()))),
            Arc::new(environments),
        )
        .unwrap();

        let mut scope = resolver.begin_request(Session::anonymous("s1"));
        assert!(!resolver.is_granted(&mut scope, "/a", &PermissionQuery::single("read")).await);
        assert!(resolver.audit().is_none());
        assert!(resolver.export_prometheus().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = AclConfig::default();
        config.acl_cache.capacity = 0;

        let environments = CachingEnvironmentResolver::new(
            Arc::new(MemoryEnvironmentSource::new()),
            10,
            Duration::from_secs(60),
        )
        .unwrap();
        let result = AuthzResolver::new(
            &config,
            Arc::new(TreeReferenceResolver::new(Arc::new(MemoryTree::new()))),
            Arc::new(environments),
        );
        assert!(result.is_err());
    }
}
