//! Engine configuration loading and validation

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::error::{AclError, Result};
use crate::query::{default_query_definitions, QueryRegistry};

/// Complete engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AclConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub acl_cache: AclCacheSection,

    #[serde(default)]
    pub environment: EnvironmentSection,

    #[serde(default)]
    pub audit: AuditSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    /// Named permission queries: `name = ["key", ...]`
    #[serde(default = "default_query_definitions")]
    pub queries: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AclCacheSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// 0 keeps entries until invalidated
    #[serde(default)]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnvironmentSection {
    #[serde(default = "default_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_environment_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_capacity() -> usize { 10_000 }
fn default_environment_ttl() -> u64 { 300 }
fn default_audit_capacity() -> usize { 1_000 }

impl Default for AclCacheSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_secs: 0,
        }
    }
}

impl Default for EnvironmentSection {
    fn default() -> Self {
        Self {
            cache_capacity: default_capacity(),
            ttl_secs: default_environment_ttl(),
        }
    }
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_audit_capacity(),
        }
    }
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            acl_cache: AclCacheSection::default(),
            environment: EnvironmentSection::default(),
            audit: AuditSection::default(),
            metrics: MetricsSection::default(),
            queries: default_query_definitions(),
        }
    }
}

impl AclConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: AclConfig =
            toml::from_str(contents).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.acl_cache.capacity == 0 {
            return Err(AclError::Config("acl_cache.capacity must be positive".into()));
        }
        if self.environment.cache_capacity == 0 {
            return Err(AclError::Config("environment.cache_capacity must be positive".into()));
        }
        if self.audit.enabled && self.audit.capacity == 0 {
            return Err(AclError::Config("audit.capacity must be positive".into()));
        }
        if let Some((name, _)) = self.queries.iter().find(|(_, keys)| keys.is_empty()) {
            return Err(AclError::Config(format!("query '{}' has no permission keys", name)));
        }

        Ok(())
    }

    pub fn acl_cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.acl_cache.capacity,
            ttl: (self.acl_cache.ttl_secs > 0).then(|| Duration::from_secs(self.acl_cache.ttl_secs)),
        }
    }

    pub fn environment_ttl(&self) -> Duration {
        Duration::from_secs(self.environment.ttl_secs)
    }

    pub fn query_registry(&self) -> Result<QueryRegistry> {
        QueryRegistry::from_definitions(&self.queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AclConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.acl_cache.capacity, 10_000);
        assert!(config.acl_cache_config().ttl.is_none());
        assert_eq!(config.environment_ttl(), Duration::from_secs(300));
        assert!(config.audit.enabled);
        assert_eq!(config.queries.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AclConfig::from_toml_str("").unwrap();
        assert_eq!(config.audit.capacity, 1_000);
        assert!(config.metrics.enabled);
        assert_eq!(config.query_registry().unwrap().len(), 4);
    }

    #[test]
    fn test_partial_sections() {
        let config = AclConfig::from_toml_str(
            r#"
            log_level = "debug"

            [acl_cache]
            ttl_secs = 60

            [queries]
            publish = ["publish", "manage"]
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.acl_cache.capacity, 10_000);
        assert_eq!(config.acl_cache_config().ttl, Some(Duration::from_secs(60)));
        assert_eq!(config.queries.len(), 1);
        assert!(config.query_registry().unwrap().get("publish").is_some());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = AclConfig::default();
        config.acl_cache.capacity = 0;
        assert!(matches!(config.validate(), Err(AclError::Config(_))));

        let err = AclConfig::from_toml_str("[environment]\ncache_capacity = 0").unwrap_err();
        assert!(format!("{:#}", err).contains("cache_capacity"));
    }

    #[test]
    fn test_validate_rejects_empty_query() {
        assert!(AclConfig::from_toml_str("[queries]\nread = []").is_err());
    }
}
