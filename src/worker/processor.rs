//! Per-task processor — runs one claimed task end-to-end.
//!
//! The processor owns the full `queued → running → terminal` path for its
//! task: the idempotency gate, the status transitions, the capability
//! invocation, and the single outcome publish. Every error is contained
//! here; nothing propagates to the consumer loop.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::agent::{self, AgentRegistry};
use crate::queue::MessageSink;
use crate::store::StatusStore;
use crate::task::{Outcome, TaskMessage, TaskStatus};
use crate::worker::gate::AdmissionPermit;

/// Error code published when the fault is in the worker's own plumbing
/// rather than the capability.
const INFRA_ERROR_CODE: &str = "PROCESSING_ERROR";

/// Shared dependencies for task processing.
#[derive(Clone)]
pub struct ProcessorDeps {
    pub store: Arc<dyn StatusStore>,
    pub sink: Arc<dyn MessageSink>,
    pub registry: Arc<AgentRegistry>,
    /// Topic outcomes are published to.
    pub result_topic: String,
}

/// Processor for a single claimed task.
pub struct TaskProcessor {
    task: TaskMessage,
    deps: ProcessorDeps,
}

impl TaskProcessor {
    pub fn new(task: TaskMessage, deps: ProcessorDeps) -> Self {
        Self { task, deps }
    }

    /// Run the task to completion.
    ///
    /// The admission permit is released when this returns — including every
    /// early-return and error path — because it drops with the function
    /// scope.
    pub async fn run(self, _permit: AdmissionPermit) {
        if let Some(outcome) = self.process().await {
            self.publish(&outcome).await;
        }
    }

    /// Returns the outcome to publish, or `None` on an idempotent skip.
    async fn process(&self) -> Option<Outcome> {
        let task_id = &self.task.task_id;

        // Idempotency gate: a terminal task was either processed by an
        // earlier delivery or revoked before any claim. Either way this
        // delivery is a no-op.
        match self.deps.store.status(task_id).await {
            Ok(Some(TaskStatus::Canceled)) => {
                info!(%task_id, "Task canceled before claim, skipping");
                return None;
            }
            Ok(Some(status)) if status.is_terminal() => {
                info!(%task_id, %status, "Task already terminal, duplicate delivery absorbed");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                error!(%task_id, error = %e, "Status read failed");
                return Some(self.infra_failure(format!("status read failed: {e}")).await);
            }
        }

        if let Err(e) = self.deps.store.set_status(task_id, TaskStatus::Running).await {
            error!(%task_id, error = %e, "Failed to mark task running");
            return Some(self.infra_failure(format!("status write failed: {e}")).await);
        }
        debug!(%task_id, agent_type = %self.task.agent_type, "Task running");

        let outcome = match self.deps.registry.resolve(&self.task.agent_type) {
            Ok(capability) => agent::run_capability(capability.as_ref(), &self.task).await,
            Err(e) => {
                // Dispatch error, not a capability fault: no silent fallback.
                Outcome::failure(task_id, &self.task.user_id, e.code(), e.to_string())
            }
        };

        if outcome.success {
            let data = outcome.result.clone().unwrap_or(serde_json::Value::Null);
            if let Err(e) = self.deps.store.finish(task_id, TaskStatus::Done, &data).await {
                error!(%task_id, error = %e, "Failed to record task completion");
                return Some(self.infra_failure(format!("result write failed: {e}")).await);
            }
            info!(%task_id, "Task done");
        } else {
            if let Err(e) = self.deps.store.set_status(task_id, TaskStatus::Failed).await {
                error!(%task_id, error = %e, "Failed to record task failure");
            }
            info!(%task_id, "Task failed");
        }

        Some(outcome)
    }

    /// Contain an infrastructure fault: best-effort `failed` status plus an
    /// error outcome for the sink. Never propagates.
    async fn infra_failure(&self, message: String) -> Outcome {
        if let Err(e) = self
            .deps
            .store
            .set_status(&self.task.task_id, TaskStatus::Failed)
            .await
        {
            error!(task_id = %self.task.task_id, error = %e, "Failed to record task failure");
        }
        Outcome::failure(
            &self.task.task_id,
            &self.task.user_id,
            INFRA_ERROR_CODE,
            message,
        )
    }

    /// Publish the outcome exactly once, after the terminal status write.
    async fn publish(&self, outcome: &Outcome) {
        let body = match serde_json::to_string(outcome) {
            Ok(body) => body,
            Err(e) => {
                error!(task_id = %outcome.task_id, error = %e, "Failed to serialize outcome");
                return;
            }
        };
        if let Err(e) = self
            .deps
            .sink
            .send(&self.deps.result_topic, body, &outcome.task_id)
            .await
        {
            error!(task_id = %outcome.task_id, error = %e, "Failed to publish outcome");
        } else {
            debug!(task_id = %outcome.task_id, success = outcome.success, "Outcome published");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::agent::ProfileAgent;
    use crate::queue::{MemoryBroker, MessageSource};
    use crate::store::MemoryStore;
    use crate::worker::gate::AdmissionGate;

    const RESULT_TOPIC: &str = "task.results";

    fn deps(store: Arc<dyn StatusStore>, broker: Arc<MemoryBroker>) -> ProcessorDeps {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ProfileAgent::new(Duration::ZERO)));
        ProcessorDeps {
            store,
            sink: broker,
            registry: Arc::new(registry),
            result_topic: RESULT_TOPIC.to_string(),
        }
    }

    fn message(task_id: &str, agent_type: &str) -> TaskMessage {
        TaskMessage {
            task_id: task_id.to_string(),
            user_id: "u1".to_string(),
            payload: "watch price drop".to_string(),
            agent_type: agent_type.to_string(),
        }
    }

    async fn published(broker: &Arc<MemoryBroker>) -> Vec<Outcome> {
        let source = broker.source(RESULT_TOPIC);
        source
            .receive(64, Duration::from_secs(30))
            .await
            .unwrap()
            .into_iter()
            .map(|d| serde_json::from_str(&d.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn successful_task_ends_done_with_one_outcome() {
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStore::new(Duration::from_secs(60)));
        let broker = Arc::new(MemoryBroker::new());
        let gate = AdmissionGate::new(1);

        let processor = TaskProcessor::new(message("t1", "profile"), deps(store.clone(), broker.clone()));
        processor.run(gate.acquire().await.unwrap()).await;

        assert_eq!(store.status("t1").await.unwrap(), Some(TaskStatus::Done));
        assert!(store.result("t1").await.unwrap().is_some());

        let outcomes = published(&broker).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].task_id, "t1");
        // Permit came back.
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn unknown_agent_type_fails_without_fallback() {
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStore::new(Duration::from_secs(60)));
        let broker = Arc::new(MemoryBroker::new());
        let gate = AdmissionGate::new(1);

        let processor = TaskProcessor::new(message("t1", "nope"), deps(store.clone(), broker.clone()));
        processor.run(gate.acquire().await.unwrap()).await;

        assert_eq!(store.status("t1").await.unwrap(), Some(TaskStatus::Failed));
        let outcomes = published(&broker).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].error.as_ref().unwrap().code, "UNKNOWN_AGENT_TYPE");
    }

    #[tokio::test]
    async fn terminal_task_is_skipped_without_publish() {
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStore::new(Duration::from_secs(60)));
        let broker = Arc::new(MemoryBroker::new());
        let gate = AdmissionGate::new(1);
        store.set_status("t1", TaskStatus::Done).await.unwrap();

        let processor = TaskProcessor::new(message("t1", "profile"), deps(store.clone(), broker.clone()));
        processor.run(gate.acquire().await.unwrap()).await;

        assert_eq!(store.status("t1").await.unwrap(), Some(TaskStatus::Done));
        assert!(published(&broker).await.is_empty());
    }

    #[tokio::test]
    async fn canceled_task_is_never_claimed() {
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStore::new(Duration::from_secs(60)));
        let broker = Arc::new(MemoryBroker::new());
        let gate = AdmissionGate::new(1);
        store.set_status("t1", TaskStatus::Canceled).await.unwrap();

        let processor = TaskProcessor::new(message("t1", "profile"), deps(store.clone(), broker.clone()));
        processor.run(gate.acquire().await.unwrap()).await;

        assert_eq!(store.status("t1").await.unwrap(), Some(TaskStatus::Canceled));
        assert!(published(&broker).await.is_empty());
    }
}
