//! Access control statements
//!
//! A statement is a single fact attached to a resource node: *subject S is
//! granted (or denied) permission key K*, optionally propagating to the
//! node's descendants. Statements are immutable once parsed from the node's
//! stored ACL attribute.

mod subject;

pub use subject::{SubjectStatement, SubjectType};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AclError, Result};

/// Single grant/deny fact attached to a resource node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StoredStatement")]
pub struct AccessControlStatement {
    key: String,
    subject: SubjectStatement,
    granted: bool,
    propagating: bool,
}

/// Shape of a statement inside a node's stored ACL attribute
#[derive(Debug, Deserialize)]
struct StoredStatement {
    key: String,
    subject: SubjectStatement,
    granted: bool,
    #[serde(default)]
    propagating: bool,
}

impl TryFrom<StoredStatement> for AccessControlStatement {
    type Error = AclError;

    fn try_from(stored: StoredStatement) -> Result<Self> {
        let key = stored.key.trim();
        if key.is_empty() {
            return Err(AclError::InvalidStatement("statement key cannot be empty".to_string()));
        }

        Ok(Self::new(key, stored.subject, stored.granted, stored.propagating))
    }
}

impl AccessControlStatement {
    pub fn new(
        key: impl Into<String>,
        subject: SubjectStatement,
        granted: bool,
        propagating: bool,
    ) -> Self {
        Self {
            key: key.into(),
            subject,
            granted,
            propagating,
        }
    }

    /// Parse one entry of a stored ACL attribute
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a stored ACL attribute, dropping entries that cannot be read
    ///
    /// Returns the parsed statements and the number of entries dropped.
    pub fn parse_all(values: &[serde_json::Value]) -> (Vec<Self>, usize) {
        let mut statements = Vec::with_capacity(values.len());
        let mut dropped = 0;

        for value in values {
            match Self::from_value(value.clone()) {
                Ok(statement) => statements.push(statement),
                Err(_) => dropped += 1,
            }
        }

        (statements, dropped)
    }

    /// Permission key (e.g. `read`)
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subject(&self) -> &SubjectStatement {
        &self.subject
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// Whether the statement applies to descendants of its node
    pub fn is_propagating(&self) -> bool {
        self.propagating
    }
}

impl fmt::Display for AccessControlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} to {}",
            if self.granted { "grant" } else { "deny" },
            self.key,
            self.subject
        )?;
        if self.propagating {
            f.write_str(" (propagating)")?;
        }
        Ok(())
    }
}
