//! Principal environments
//!
//! A [`UserEnvironment`] describes who is acting (principal id plus group
//! memberships) and answers whether that principal is selected by a
//! statement's [`SubjectStatement`].

mod resolver;

pub use resolver::{
    CachingEnvironmentResolver, EnvironmentRecord, EnvironmentSource, MemoryEnvironmentSource,
    UserEnvironmentResolver,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::statement::{SubjectStatement, SubjectType};

/// Inbound session as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier
    pub id: String,

    /// Authenticated principal, `None` for anonymous sessions
    #[serde(default)]
    pub principal_id: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, principal_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            principal_id: Some(principal_id.into()),
        }
    }

    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            principal_id: None,
        }
    }

    /// Principal id, ignoring blank values
    pub fn principal(&self) -> Option<&str> {
        self.principal_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Resolved identity and memberships of the acting principal
///
/// Group memberships map a group token to the permission tokens recorded for
/// that membership. An empty set is a bare membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnvironment {
    principal_id: Option<String>,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    groups: HashMap<String, HashSet<String>>,
}

impl UserEnvironment {
    pub fn new(principal_id: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            principal_id: Some(principal_id.into()),
            expires_at,
            groups: HashMap::new(),
        }
    }

    /// Environment that only matches `ANON` subjects; never expires
    pub fn anonymous() -> Self {
        Self {
            principal_id: None,
            expires_at: DateTime::<Utc>::MAX_UTC,
            groups: HashMap::new(),
        }
    }

    /// Add a bare group membership
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.entry(group.into()).or_default();
        self
    }

    /// Add a group membership carrying permission tokens
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

    pub fn principal_id(&self) -> Option<&str> {
        self.principal_id.as_deref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal_id
            .as_deref()
            .map_or(true, |p| p.trim().is_empty())
    }

    pub fn has_expired(&self) -> bool {
        self.has_expired_at(Utc::now())
    }

    pub fn has_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Groups this principal belongs to
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Does this principal match the statement subject?
    pub fn matches(&self, subject: &SubjectStatement) -> bool {
        match subject.subject_type() {
            SubjectType::Anon => true,
            SubjectType::Authenticated => !self.is_anonymous(),
            SubjectType::UserId => self.principal_id.as_deref() == Some(subject.token()),
            SubjectType::Group => match self.groups.get(subject.token()) {
                // bare memberships match any permission token
                Some(permissions) if permissions.is_empty() => true,
                Some(permissions) => permissions.contains(subject.permission_token()),
                None => false,
            },
            SubjectType::Undefined => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bob() -> UserEnvironment {
        UserEnvironment::new("bob", Utc::now() + Duration::minutes(5))
            .with_group("g1")
            .with_group_permissions("editors", ["write"])
    }

    #[test]
    fn test_anon_always_matches() {
        assert!(bob().matches(&SubjectStatement::anon()));
        assert!(UserEnvironment::anonymous().matches(&SubjectStatement::anon()));
    }

    #[test]
    fn test_authenticated() {
        assert!(bob().matches(&SubjectStatement::authenticated()));
        assert!(!UserEnvironment::anonymous().matches(&SubjectStatement::authenticated()));

        let blank = UserEnvironment::new("   ", Utc::now() + Duration::minutes(5));
        assert!(!blank.matches(&SubjectStatement::authenticated()));
    }

    #[test]
    fn test_user_id() {
        assert!(bob().matches(&SubjectStatement::user("bob")));
        assert!(!bob().matches(&SubjectStatement::user("alice")));
    }

    #[test]
    fn test_bare_group_membership_matches_any_permission() {
        assert!(bob().matches(&SubjectStatement::group("g1", "")));
        assert!(bob().matches(&SubjectStatement::group("g1", "manage")));
        assert!(!bob().matches(&SubjectStatement::group("g2", "")));
    }

    #[test]
    fn test_group_permission_set_is_enforced() {
        assert!(bob().matches(&SubjectStatement::group("editors", "write")));
        assert!(!bob().matches(&SubjectStatement::group("editors", "manage")));
        assert!(!bob().matches(&SubjectStatement::group("editors", "")));
    }

    #[test]
    fn test_undefined_never_matches() {
        assert!(!bob().matches(&SubjectStatement::undefined("ROLE:admin")));
        assert!(!UserEnvironment::anonymous().matches(&SubjectStatement::undefined("")));
    }

    #[test]
    fn test_expiry() {
        let env = UserEnvironment::new("bob", Utc::now() - Duration::seconds(1));
        assert!(env.has_expired());
        assert!(!bob().has_expired());
        assert!(!UserEnvironment::anonymous().has_expired());
    }

    #[test]
    fn test_session_principal_ignores_blank() {
        assert_eq!(Session::new("s1", "bob").principal(), Some("bob"));
        assert_eq!(Session::new("s1", "  ").principal(), None);
        assert_eq!(Session::anonymous("s1").principal(), None);
    }
}
