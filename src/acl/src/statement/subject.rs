//! Statement subjects: the principal-matching half of an ACL statement

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AclError;

/// Kind of principal a subject statement selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectType {
    /// Members of a group
    Group,
    /// A single principal id
    UserId,
    /// Any authenticated principal
    Authenticated,
    /// Everyone, including anonymous sessions
    Anon,
    /// Unparseable subject; never matches
    Undefined,
}

impl SubjectType {
    /// Stored tag for this type
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Group => "GR",
            Self::UserId => "UID",
            Self::Authenticated => "AU",
            Self::Anon => "AN",
            Self::Undefined => "UNDEF",
        }
    }

    /// Parse a stored tag, degrading unknown tags to [`SubjectType::Undefined`]
    pub fn parse_lenient(tag: &str) -> Self {
        tag.parse().unwrap_or(Self::Undefined)
    }
}

impl FromStr for SubjectType {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "GR" => Ok(Self::Group),
            "UID" => Ok(Self::UserId),
            "AU" => Ok(Self::Authenticated),
            "AN" => Ok(Self::Anon),
            other => Err(AclError::InvalidStatement(format!("unknown subject type '{}'", other))),
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Subject of an access control statement
///
/// Stored as `TYPE[:token[:permission_token]]`, e.g. `GR:editors:write`,
/// `UID:bob`, `AU`, `AN`. Parsing never fails: anything unrecognised becomes
/// an [`SubjectType::Undefined`] subject carrying the raw input as its token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SubjectStatement {
    subject_type: SubjectType,
    token: String,
    permission_token: String,
}

impl SubjectStatement {
    pub fn new(
        subject_type: SubjectType,
        token: impl Into<String>,
        permission_token: impl Into<String>,
    ) -> Self {
        Self {
            subject_type,
            token: token.into(),
            permission_token: permission_token.into(),
        }
    }

    /// Group membership subject, optionally narrowed to a permission the group holds
    pub fn group(group: impl Into<String>, permission_token: impl Into<String>) -> Self {
        Self::new(SubjectType::Group, group, permission_token)
    }

    pub fn user(principal_id: impl Into<String>) -> Self {
        Self::new(SubjectType::UserId, principal_id, "")
    }

    pub fn authenticated() -> Self {
        Self::new(SubjectType::Authenticated, "", "")
    }

    pub fn anon() -> Self {
        Self::new(SubjectType::Anon, "", "")
    }

    pub fn undefined(raw: impl Into<String>) -> Self {
        Self::new(SubjectType::Undefined, raw, "")
    }

    /// Parse the stored form
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, ':');
        let tag = parts.next().unwrap_or_default();
        let token = parts.next().unwrap_or_default().trim();
        let permission_token = parts.next().unwrap_or_default().trim();

        match SubjectType::parse_lenient(tag) {
            SubjectType::Anon => Self::anon(),
            SubjectType::Authenticated => Self::authenticated(),
            SubjectType::UserId if !token.is_empty() => Self::user(token),
            SubjectType::Group if !token.is_empty() => Self::group(token, permission_token),
            _ => Self::undefined(raw),
        }
    }

    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn permission_token(&self) -> &str {
        &self.permission_token
    }

    pub fn is_undefined(&self) -> bool {
        self.subject_type == SubjectType::Undefined
    }
}

impl From<String> for SubjectStatement {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<SubjectStatement> for String {
    fn from(subject: SubjectStatement) -> Self {
        subject.to_string()
    }
}

impl fmt::Display for SubjectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subject_type {
            SubjectType::Anon | SubjectType::Authenticated => f.write_str(self.subject_type.tag()),
            SubjectType::UserId => write!(f, "UID:{}", self.token),
            SubjectType::Group if self.permission_token.is_empty() => write!(f, "GR:{}", self.token),
            SubjectType::Group => write!(f, "GR:{}:{}", self.token, self.permission_token),
            // raw input, so a re-parse stays undefined
            SubjectType::Undefined => f.write_str(&self.token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_types() {
        assert_eq!(SubjectStatement::parse("AN"), SubjectStatement::anon());
        assert_eq!(SubjectStatement::parse("AU"), SubjectStatement::authenticated());
        assert_eq!(SubjectStatement::parse("UID:bob"), SubjectStatement::user("bob"));
        assert_eq!(SubjectStatement::parse("GR:g1"), SubjectStatement::group("g1", ""));
        assert_eq!(
            SubjectStatement::parse("GR:editors:write"),
            SubjectStatement::group("editors", "write")
        );
    }

    #[test]
    fn test_parse_degrades_to_undefined() {
        for raw in ["", "XX:foo", "UID", "UID:", "GR", "GR::write", "gr:g1"] {
            let subject = SubjectStatement::parse(raw);
            assert!(subject.is_undefined(), "'{}' should be undefined", raw);
        }
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(SubjectStatement::group("g1", "read"), SubjectStatement::group("g1", "read"));
        assert_ne!(SubjectStatement::group("g1", "read"), SubjectStatement::group("g1", "write"));
        assert_ne!(SubjectStatement::group("bob", ""), SubjectStatement::user("bob"));
    }

    #[test]
    fn test_display_round_trips_stored_form() {
        for raw in ["AN", "AU", "UID:bob", "GR:g1", "GR:editors:write"] {
            assert_eq!(SubjectStatement::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_serde_uses_stored_form() {
        let subject = SubjectStatement::group("editors", "write");
        let json = serde_json::to_string(&subject).unwrap();
        assert_eq!(json, "\"GR:editors:write\"");

        let parsed: SubjectStatement = serde_json::from_str("\"ROLE:admin\"").unwrap();
        assert!(parsed.is_undefined());
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"ROLE:admin\"");
    }
}
