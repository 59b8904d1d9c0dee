//! libSQL status store — persistent `StatusStore` backend.
//!
//! Statuses survive worker restarts; a task submitted before a crash can
//! still be polled afterwards. Expiry is enforced on read and reclaimed by
//! `purge_expired`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::StoreError;
use crate::store::{StatusStore, result_key, status_key};
use crate::task::TaskStatus;

/// Persistent store backend over a single libSQL connection.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    ttl: Duration,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn open(path: &Path, ttl: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            ttl,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Status store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(ttl: Duration) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            ttl,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS task_state (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Schema init failed: {e}")))?;
        Ok(())
    }

    fn expiry(&self) -> String {
        (Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(1)))
            .to_rfc3339()
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO task_state (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at",
                params![key, value, self.expiry()],
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Write failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value, expires_at FROM task_state WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Query failed: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Backend(format!("Row read failed: {e}")))?
        else {
            return Ok(None);
        };

        let value: String = row
            .get(0)
            .map_err(|e| StoreError::Backend(format!("Column read failed: {e}")))?;
        let expires_raw: String = row
            .get(1)
            .map_err(|e| StoreError::Backend(format!("Column read failed: {e}")))?;

        if parse_expiry(&expires_raw) <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Delete rows whose TTL has lapsed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM task_state WHERE expires_at <= ?1",
                params![Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Purge failed: {e}")))?;
        Ok(removed as usize)
    }
}

/// Parse an RFC 3339 expiry; an unparseable value is treated as expired.
fn parse_expiry(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl StatusStore for LibSqlStore {
    async fn status(&self, task_id: &str) -> Result<Option<TaskStatus>, StoreError> {
        Ok(self
            .get(&status_key(task_id))
            .await?
            .and_then(|s| TaskStatus::parse(&s)))
    }

    async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        self.put(&status_key(task_id), &status.to_string()).await
    }

    async fn result(&self, task_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        match self.get(&result_key(task_id)).await? {
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
        // Result first, status second: a terminal status implies the result
        // row is already readable.
        self.put(&result_key(task_id), &raw).await?;
        self.put(&status_key(task_id), &status.to_string()).await
    }

    async fn clear(&self, task_id: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM task_state WHERE key IN (?1, ?2)",
                params![status_key(task_id), result_key(task_id)],
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Delete failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_roundtrip() {
        let store = LibSqlStore::new_memory(Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.status("t1").await.unwrap(), None);

        store.set_status("t1", TaskStatus::Queued).await.unwrap();
        assert_eq!(store.status("t1").await.unwrap(), Some(TaskStatus::Queued));

        store.set_status("t1", TaskStatus::Running).await.unwrap();
        assert_eq!(store.status("t1").await.unwrap(), Some(TaskStatus::Running));
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = LibSqlStore::new_memory(Duration::from_millis(20)).await.unwrap();
        store.set_status("t1", TaskStatus::Done).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.status("t1").await.unwrap(), None);

        let removed = store.purge_expired().await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn finish_then_clear() {
        let store = LibSqlStore::new_memory(Duration::from_secs(60)).await.unwrap();
        let data = serde_json::json!({"tags": ["electronics"]});
        store.finish("t1", TaskStatus::Done, &data).await.unwrap();

        assert_eq!(store.status("t1").await.unwrap(), Some(TaskStatus::Done));
        assert_eq!(store.result("t1").await.unwrap(), Some(data));

        store.clear("t1").await.unwrap();
        assert_eq!(store.status("t1").await.unwrap(), None);
        assert_eq!(store.result("t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");

        {
            let store = LibSqlStore::open(&path, Duration::from_secs(60)).await.unwrap();
            store.set_status("t1", TaskStatus::Done).await.unwrap();
        }

        let store = LibSqlStore::open(&path, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.status("t1").await.unwrap(), Some(TaskStatus::Done));
    }
}
