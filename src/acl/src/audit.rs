//! In-memory audit trail of permission denials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{PermissionDenied, Result};

/// One refused check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialRecord {
    pub id: Uuid,

    /// Resource reference that was checked
    pub resource: String,

    /// Permission query name
    pub query: String,

    /// Acting principal, `None` for anonymous sessions
    pub principal: Option<String>,

    /// Human-readable denial reason
    pub reason: String,

    pub timestamp: DateTime<Utc>,
}

impl DenialRecord {
    pub fn from_denial(denial: &PermissionDenied, principal: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource: denial.resource.clone(),
            query: denial.query.clone(),
            principal: principal.map(str::to_string),
            reason: denial.reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded log of the most recent denials
pub struct AuditLog {
    records: Arc<RwLock<VecDeque<DenialRecord>>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a record, dropping the oldest once full
    pub async fn record(&self, record: DenialRecord) {
        debug!(
            id = %record.id,
            resource = %record.resource,
            query = %record.query,
            "Denial recorded"
        );

        let mut records = self.records.write().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Up to `n` most recent records, newest first
    pub async fn recent(&self, n: usize) -> Vec<DenialRecord> {
        let records = self.records.read().await;
        records.iter().rev().take(n).cloned().collect()
    }

    /// Records for one resource, oldest first
    pub async fn for_resource(&self, resource: &str) -> Vec<DenialRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|r| r.resource == resource)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All records as a JSON array, oldest first
    pub async fn export_json(&self) -> Result<String> {
        let records = self.records.read().await;
        Ok(serde_json::to_string(&*records)?)
    }
}
