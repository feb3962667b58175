//! Request-scoped decision cache

use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::CacheScope;
use crate::environment::Session;

/// Decisions made on behalf of one inbound request
///
/// Bound by [`AuthzResolver::begin_request`](crate::AuthzResolver::begin_request)
/// and released by [`AuthzResolver::end_request`](crate::AuthzResolver::end_request).
/// Checks take the scope by `&mut`, so it cannot be shared between tasks.
#[derive(Debug)]
pub struct RequestScope {
    id: Uuid,
    session: Session,
    decisions: HashMap<String, bool>,
    started_at: Instant,
}

impl RequestScope {
    pub fn new(session: Session) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            decisions: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn scope(&self) -> CacheScope {
        CacheScope::Request
    }

    /// Decision previously recorded under `key`
    pub fn decision(&self, key: &str) -> Option<bool> {
        self.decisions.get(key).copied()
    }

    pub fn record(&mut self, key: String, granted: bool) {
        self.decisions.insert(key, granted);
    }

    /// Number of decisions recorded so far
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
