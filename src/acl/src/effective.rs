//! Effective (merged) ACL maps

use std::collections::HashMap;
use std::sync::Arc;

use crate::environment::UserEnvironment;
use crate::query::PermissionQuery;
use crate::statement::AccessControlStatement;

/// Merged permission map for one resource
///
/// Maps a permission key to the statements that apply to it, closest first:
/// the node's own statements, then statements inherited from increasingly
/// distant ancestors. Once built the map is never mutated; it is shared
/// through `Arc` and a restricted copy is made when a descendant adopts it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveAcl {
    controlling_key: Option<String>,
    entries: HashMap<String, Vec<AccessControlStatement>>,
    dependencies: Vec<String>,
    /// Built while an ancestor could not be read
    incomplete: bool,
}

impl EffectiveAcl {
    /// Map with no statements: every query is denied
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        controlling_key: Option<String>,
        entries: HashMap<String, Vec<AccessControlStatement>>,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            controlling_key,
            entries,
            dependencies,
            incomplete: false,
        }
    }

    pub(crate) fn into_incomplete(mut self) -> Self {
        self.incomplete = true;
        self
    }

    /// Whether every ancestor on the walk was read; only complete maps are cached
    pub fn is_complete(&self) -> bool {
        !self.incomplete
    }

    /// Key of the nearest node contributing a statement
    pub fn controlling_key(&self) -> Option<&str> {
        self.controlling_key.as_deref()
    }

    /// Statements for a permission key, closest first
    pub fn statements(&self, key: &str) -> &[AccessControlStatement] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Permission keys with at least one statement
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Ancestor keys whose statements (or emptiness) shaped this map
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of statements across all keys
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub(crate) fn entries(&self) -> &HashMap<String, Vec<AccessControlStatement>> {
        &self.entries
    }

    /// The part of this map a descendant inherits
    ///
    /// Everything inherited from ancestors is already propagating, so only the
    /// controlling node's own non-propagating statements are dropped. When there
    /// are none the same allocation is shared.
    pub fn inheritable(self: &Arc<Self>) -> Arc<Self> {
        let all_propagating = self
            .entries
            .values()
            .flatten()
            .all(AccessControlStatement::is_propagating);
        if all_propagating {
            return Arc::clone(self);
        }

        let entries = self
            .entries
            .iter()
            .filter_map(|(key, statements)| {
                let inherited: Vec<_> = statements
                    .iter()
                    .filter(|s| s.is_propagating())
                    .cloned()
                    .collect();
                (!inherited.is_empty()).then(|| (key.clone(), inherited))
            })
            .collect();

        Arc::new(Self {
            controlling_key: self.controlling_key.clone(),
            entries,
            dependencies: self.dependencies.clone(),
            incomplete: self.incomplete,
        })
    }

    /// First statement that decides `query` for `environment`
    ///
    /// Query statements are visited in declared order and, for each, the ACL
    /// entries closest first; the first entry whose subject matches wins.
    pub fn decide<'a>(
        &'a self,
        query: &PermissionQuery,
        environment: &UserEnvironment,
    ) -> Option<&'a AccessControlStatement> {
        query
            .statements()
            .iter()
            .flat_map(|qs| self.statements(qs.key()))
            .find(|statement| environment.matches(statement.subject()))
    }
}
