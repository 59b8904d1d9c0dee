//! In-memory status store with lazy TTL expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{StatusStore, result_key, status_key};
use crate::task::TaskStatus;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Default store backend: a TTL'd map. Suitable for a single-instance
/// worker and for tests; persistent deployments use [`super::LibSqlStore`].
pub struct MemoryStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    async fn put(&self, key: String, value: String) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        // Expired entries are dropped opportunistically on write.
        entries.retain(|_, e| e.expires_at > Instant::now());
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn status(&self, task_id: &str) -> Result<Option<TaskStatus>, StoreError> {
        Ok(self
            .get(&status_key(task_id))
            .await
            .and_then(|s| TaskStatus::parse(&s)))
    }

    async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        self.put(status_key(task_id), status.to_string()).await;
        Ok(())
    }

    async fn result(&self, task_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        match self.get(&result_key(task_id)).await {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn finish(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(result)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut entries = self.entries.write().await;
        let expires_at = Instant::now() + self.ttl;
        entries.insert(
            result_key(task_id),
            Entry {
                value: raw,
                expires_at,
            },
        );
        entries.insert(
            status_key(task_id),
            Entry {
                value: status.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn clear(&self, task_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(&status_key(task_id));
        entries.remove(&result_key(task_id));
        Ok(())
    }
}
