//! Error types for the ACL engine

use std::fmt;
use thiserror::Error;

use crate::statement::AccessControlStatement;

/// Why a permission check was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// A matching statement explicitly denies the permission
    ExplicitDeny {
        statement: AccessControlStatement,
    },

    /// No statement in the effective ACL matched the principal
    NoGrantFound,

    /// A denial recorded earlier in the same request was replayed
    CachedDenial,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitDeny { statement } => write!(f, "explicitly denied by {}", statement),
            Self::NoGrantFound => write!(f, "no grant found"),
            Self::CachedDenial => write!(f, "denied earlier in this request"),
        }
    }
}

/// The only failure surfaced by [`AuthzResolver::check`](crate::AuthzResolver::check)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission denied on '{resource}' for query '{query}': {reason}")]
pub struct PermissionDenied {
    /// Resource reference that was checked
    pub resource: String,

    /// Name of the permission query
    pub query: String,

    /// Why access was refused
    pub reason: DenialReason,
}

impl PermissionDenied {
    pub fn new(resource: impl Into<String>, query: impl Into<String>, reason: DenialReason) -> Self {
        Self {
            resource: resource.into(),
            query: query.into(),
            reason,
        }
    }

    /// The statement that denied access, if the denial was explicit
    pub fn denying_statement(&self) -> Option<&AccessControlStatement> {
        match &self.reason {
            DenialReason::ExplicitDeny { statement } => Some(statement),
            _ => None,
        }
    }
}

/// ACL engine errors
#[derive(Debug, Error)]
pub enum AclError {
    /// Access refused
    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),

    /// A stored statement could not be turned into an [`AccessControlStatement`]
    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    /// Backing tree store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Environment source failure
    #[error("Environment error: {0}")]
    Environment(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ACL operations
pub type Result<T> = std::result::Result<T, AclError>;
