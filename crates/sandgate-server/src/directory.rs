//! Instance directory: resolves an instance to its workspace and members.
//!
//! The real directory lives in the persistence layer; the gateway only
//! consumes this seam. A static in-memory implementation backs local dev
//! and tests.

use async_trait::async_trait;
use sandgate_core::{GatewayError, GatewayResult};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// What the directory knows about one instance.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub workspace_id: String,
    /// User ids of the owning organization's members.
    pub member_ids: Vec<String>,
}

impl InstanceRecord {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == user_id)
    }
}

/// Resolves instance identifiers for authorization decisions.
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// Resolve an instance, failing with `InstanceNotFound` if it no longer
    /// exists.
    async fn resolve(&self, instance_id: &str) -> GatewayResult<InstanceRecord>;
}

/// In-memory directory seeded from config. Dev and test use only.
pub struct StaticDirectory {
    records: RwLock<HashMap<String, InstanceRecord>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, record: InstanceRecord) {
        let mut records = self.records.write().await;
        records.insert(record.instance_id.clone(), record);
    }

    pub async fn remove(&self, instance_id: &str) {
        let mut records = self.records.write().await;
        records.remove(instance_id);
    }
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceDirectory for StaticDirectory {
    async fn resolve(&self, instance_id: &str) -> GatewayResult<InstanceRecord> {
        let records = self.records.read().await;
        records
            .get(instance_id)
            .cloned()
            .ok_or_else(|| GatewayError::InstanceNotFound(instance_id.to_string()))
    }
}
