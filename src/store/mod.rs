//! Task status store — the single source of truth for task lifecycle.
//!
//! The store is logically partitioned by task id: concurrent processors
//! never contend on the same key, and each per-key write is atomic. Entries
//! expire after the configured TTL.

mod libsql_backend;
mod memory;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::task::TaskStatus;

/// Store key for a task's status entry.
pub fn status_key(task_id: &str) -> String {
    format!("task:{task_id}:status")
}

/// Store key for a task's result entry.
pub fn result_key(task_id: &str) -> String {
    format!("task:{task_id}:result")
}

/// Backend-agnostic status store.
///
/// The task processor is the only writer on the `queued → running → terminal`
/// path; the HTTP front door writes `queued` on submission and `canceled`
/// before a claim.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Read the current status of a task. `None` means unknown or expired.
    async fn status(&self, task_id: &str) -> Result<Option<TaskStatus>, StoreError>;

    /// Write a task's status, refreshing its TTL.
    async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError>;

    /// Read a task's stored result data, if any.
    async fn result(&self, task_id: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Write the result data and the terminal status in one step.
    async fn finish(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Remove all entries for a task (submission rollback).
    async fn clear(&self, task_id: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(status_key("t1"), "task:t1:status");
        assert_eq!(result_key("t1"), "task:t1:result");
    }
}
