//! Prometheus-style metrics for ACL checks

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Snapshot of check counters and latency percentiles
#[derive(Debug, Clone, Default)]
pub struct AclMetrics {
    /// Total number of checks
    pub checks: u64,

    pub grants: u64,

    pub denials: u64,

    /// Decisions replayed from the request scope
    pub request_cache_hits: u64,
    pub request_cache_misses: u64,

    /// Merged ACL lookups served by the ACL cache
    pub acl_cache_hits: u64,
    pub acl_cache_misses: u64,

    /// Merged ACLs built by walking the tree
    pub merge_walks: u64,

    /// Ancestors read across all walks
    pub ancestors_walked: u64,

    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,
    pub avg_latency_ms: f64,
}

impl AclMetrics {
    pub fn grant_rate(&self) -> f64 {
        let total = self.grants + self.denials;
        if total == 0 {
            0.0
        } else {
            self.grants as f64 / total as f64
        }
    }

    pub fn acl_cache_hit_rate(&self) -> f64 {
        let total = self.acl_cache_hits + self.acl_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.acl_cache_hits as f64 / total as f64
        }
    }
}

/// Metrics collector shared by the resolver
pub struct MetricsCollector {
    metrics: Arc<RwLock<AclMetrics>>,

    /// Recent latency samples in milliseconds
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_max_samples(10_000)
    }

    pub fn with_max_samples(max_samples: usize) -> Self {
        let max_samples = max_samples.max(10);
        Self {
            metrics: Arc::new(RwLock::new(AclMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(max_samples))),
            max_samples,
        }
    }

    pub async fn record_decision(&self, granted: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.checks += 1;

        if granted {
            metrics.grants += 1;
        } else {
            metrics.denials += 1;
        }
    }

    pub async fn record_request_cache(&self, hit: bool) {
        let mut metrics = self.metrics.write().await;
        if hit {
            metrics.request_cache_hits += 1;
        } else {
            metrics.request_cache_misses += 1;
        }
    }

    pub async fn record_acl_cache(&self, hit: bool) {
        let mut metrics = self.metrics.write().await;
        if hit {
            metrics.acl_cache_hits += 1;
        } else {
            metrics.acl_cache_misses += 1;
        }
    }

    /// Record a merge walk that read `ancestors` nodes
    pub async fn record_merge(&self, ancestors: usize) {
        let mut metrics = self.metrics.write().await;
        metrics.merge_walks += 1;
        metrics.ancestors_walked += ancestors as u64;
    }

    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);

        // Drop the oldest tenth once full
        if samples.len() > self.max_samples {
            let excess = self.max_samples / 10;
            samples.drain(0..excess);
        }
    }

    /// Snapshot of the counters, with latency percentiles over the sample window
    pub async fn get_metrics(&self) -> AclMetrics {
        let mut snapshot = self.metrics.read().await.clone();

        let mut sorted = self.latency_samples.read().await.clone();
        if !sorted.is_empty() {
            sorted.sort_by(f64::total_cmp);
            snapshot.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
            snapshot.latency_p50_ms = Self::percentile(&sorted, 0.50);
            snapshot.latency_p90_ms = Self::percentile(&sorted, 0.90);
            snapshot.latency_p99_ms = Self::percentile(&sorted, 0.99);
        }

        snapshot
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = AclMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export in Prometheus text format
    ///
    /// `invalidations` comes from the ACL cache, which counts them itself.
    pub async fn export_prometheus(&self, invalidations: usize) -> String {
        let metrics = self.get_metrics().await;

        format!(
            r#"# HELP acl_checks_total Total number of permission checks
# TYPE acl_checks_total counter
acl_checks_total {}

# HELP acl_grants_total Checks that were granted
# TYPE acl_grants_total counter
acl_grants_total {}

# HELP acl_denials_total Checks that were denied
# TYPE acl_denials_total counter
acl_denials_total {}

# HELP acl_request_cache_hits_total Decisions replayed from the request scope
# TYPE acl_request_cache_hits_total counter
acl_request_cache_hits_total {}

# HELP acl_request_cache_misses_total Decisions not yet made in the request scope
# TYPE acl_request_cache_misses_total counter
acl_request_cache_misses_total {}

# HELP acl_cache_hits_total Merged ACL lookups served from cache
# TYPE acl_cache_hits_total counter
acl_cache_hits_total {}

# HELP acl_cache_misses_total Merged ACL lookups that required a walk
# TYPE acl_cache_misses_total counter
acl_cache_misses_total {}

# HELP acl_merge_walks_total Merged ACLs built from the tree
# TYPE acl_merge_walks_total counter
acl_merge_walks_total {}

# HELP acl_ancestors_walked_total Ancestor nodes read during merge walks
# TYPE acl_ancestors_walked_total counter
acl_ancestors_walked_total {}

# HELP acl_cache_invalidations_total ACL change notifications processed
# TYPE acl_cache_invalidations_total counter
acl_cache_invalidations_total {}

# HELP acl_check_latency_seconds Check latency percentiles
# TYPE acl_check_latency_seconds summary
acl_check_latency_seconds{{quantile="0.5"}} {}
acl_check_latency_seconds{{quantile="0.9"}} {}
acl_check_latency_seconds{{quantile="0.99"}} {}
"#,
            metrics.checks,
            metrics.grants,
            metrics.denials,
            metrics.request_cache_hits,
            metrics.request_cache_misses,
            metrics.acl_cache_hits,
            metrics.acl_cache_misses,
            metrics.merge_walks,
            metrics.ancestors_walked,
            invalidations,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
