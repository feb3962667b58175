//! Permission queries

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::error::{AclError, Result};

/// One permission key a query accepts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryStatement {
    key: String,
}

impl QueryStatement {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Named, ordered list of permission keys
///
/// A check succeeds on the first key, in declared order, for which the ACL
/// holds a statement matching the principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionQuery {
    name: String,
    statements: Vec<QueryStatement>,
}

impl PermissionQuery {
    pub fn new<I, S>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            statements: keys.into_iter().map(QueryStatement::new).collect(),
        }
    }

    /// Query accepting exactly one key, named after it
    pub fn single(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(key.clone(), [key])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statements(&self) -> &[QueryStatement] {
        &self.statements
    }

    /// Request-cache key for this query against `reference`
    ///
    /// Deterministic in the query name, its keys (in order) and the reference.
    pub fn key(&self, reference: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        hasher.update(&[0]);
        for statement in &self.statements {
            hasher.update(statement.key.as_bytes());
            hasher.update(&[1]);
        }
        hasher.update(&[0]);
        hasher.update(reference.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for PermissionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.statements.iter().map(QueryStatement::key).collect();
        write!(f, "{}[{}]", self.name, keys.join(","))
    }
}

/// Named queries known to the engine
#[derive(Debug, Clone)]
pub struct QueryRegistry {
    queries: HashMap<String, Arc<PermissionQuery>>,
}

impl QueryRegistry {
    pub fn empty() -> Self {
        Self {
            queries: HashMap::new(),
        }
    }

    /// Build from `name -> keys` definitions
    pub fn from_definitions(definitions: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut registry = Self::empty();
        for (name, keys) in definitions {
            registry.register(PermissionQuery::new(name.clone(), keys.iter().cloned()))?;
        }
        info!(queries = registry.queries.len(), "Query registry loaded");
        Ok(registry)
    }

    /// Add or replace a query; rejects queries without keys
    pub fn register(&mut self, query: PermissionQuery) -> Result<()> {
        if query.statements.is_empty() {
            return Err(AclError::Config(format!(
                "query '{}' has no permission keys",
                query.name
            )));
        }
        if let Some(blank) = query.statements.iter().find(|s| s.key.trim().is_empty()) {
            return Err(AclError::Config(format!(
                "query '{}' has a blank permission key '{}'",
                query.name, blank.key
            )));
        }

        self.queries.insert(query.name.clone(), Arc::new(query));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<PermissionQuery>> {
        self.queries.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Default query definitions: `read`, `write`, `delete`, `manage`
pub fn default_query_definitions() -> HashMap<String, Vec<String>> {
    [
        ("read", vec!["read"]),
        ("write", vec!["write", "manage"]),
        ("delete", vec!["delete", "manage"]),
        ("manage", vec!["manage"]),
    ]
    .into_iter()
    .map(|(name, keys)| {
        (
            name.to_string(),
            keys.into_iter().map(str::to_string).collect(),
        )
    })
    .collect()
}

impl Default for QueryRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (name, keys) in default_query_definitions() {
            registry
                .queries
                .insert(name.clone(), Arc::new(PermissionQuery::new(name, keys)));
        }
        registry
    }
}
