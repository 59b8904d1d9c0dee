//! Lifecycle controller — wires dependencies and manages startup/shutdown.
//!
//! Shutdown is two-phase and bounded: stop polling (abort the loop if it
//! ignores the flag past `stop_timeout`), then wait `drain_timeout` for the
//! in-flight processors to finish. Neither phase can hang process exit.
//! The status store may be shared with other components and is left for
//! the caller to manage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agent::AgentRegistry;
use crate::config::{QueueConfig, WorkerConfig};
use crate::error::WorkerError;
use crate::queue::{MessageSink, MessageSource};
use crate::store::StatusStore;
use crate::worker::consumer::ConsumerLoop;
use crate::worker::gate::AdmissionGate;
use crate::worker::processor::ProcessorDeps;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        write!(f, "{s}")
    }
}

/// Owns the consumer loop and the admission gate for one worker instance.
///
/// All collaborators are injected — constructed once by the caller and
/// shared by handle.
pub struct WorkerController {
    store: Arc<dyn StatusStore>,
    source: Arc<dyn MessageSource>,
    sink: Arc<dyn MessageSink>,
    registry: Arc<AgentRegistry>,
    worker_config: WorkerConfig,
    queue_config: QueueConfig,
    gate: AdmissionGate,
    stop: Arc<AtomicBool>,
    state: RwLock<ControllerState>,
    consumer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerController {
    pub fn new(
        store: Arc<dyn StatusStore>,
        source: Arc<dyn MessageSource>,
        sink: Arc<dyn MessageSink>,
        registry: Arc<AgentRegistry>,
        worker_config: WorkerConfig,
        queue_config: QueueConfig,
    ) -> Self {
        let gate = AdmissionGate::new(worker_config.max_concurrent_tasks);
        Self {
            store,
            source,
            sink,
            registry,
            worker_config,
            queue_config,
            gate,
            stop: Arc::new(AtomicBool::new(false)),
            state: RwLock::new(ControllerState::Stopped),
            consumer_handle: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ControllerState {
        *self.state.read().await
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Launch the consumer loop.
    pub async fn start(&self) -> Result<(), WorkerError> {
        {
            let mut state = self.state.write().await;
            if *state != ControllerState::Stopped {
                return Err(WorkerError::AlreadyStarted);
            }
            *state = ControllerState::Starting;
        }

        self.stop.store(false, Ordering::Relaxed);

        let deps = ProcessorDeps {
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            registry: Arc::clone(&self.registry),
            result_topic: self.queue_config.result_topic.clone(),
        };
        let consumer = ConsumerLoop::new(
            Arc::clone(&self.source),
            self.gate.clone(),
            deps,
            self.worker_config.clone(),
            Arc::clone(&self.stop),
        );
        *self.consumer_handle.lock().await = Some(consumer.spawn());

        *self.state.write().await = ControllerState::Running;
        info!(
            capacity = self.gate.capacity(),
            result_topic = %self.queue_config.result_topic,
            "Worker started"
        );
        Ok(())
    }

    /// Stop polling and drain in-flight tasks, bounded by the configured
    /// timeouts. Always returns.
    pub async fn shutdown(&self) -> Result<(), WorkerError> {
        {
            let mut state = self.state.write().await;
            if *state != ControllerState::Running {
                return Err(WorkerError::NotRunning);
            }
            *state = ControllerState::Stopping;
        }
        info!("Worker stopping");

        // Phase 1: stop the consumer loop.
        self.stop.store(true, Ordering::Relaxed);
        if let Some(mut handle) = self.consumer_handle.lock().await.take() {
            match tokio::time::timeout(self.worker_config.stop_timeout, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(
                        timeout_secs = self.worker_config.stop_timeout.as_secs(),
                        "Consumer loop did not stop in time, aborting"
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        // Phase 2: drain in-flight processors.
        let pending = self.gate.in_flight();
        if pending > 0 {
            info!(pending, "Waiting for in-flight tasks to drain");
        }
        if !self.gate.drain(self.worker_config.drain_timeout).await {
            warn!(
                in_flight = self.gate.in_flight(),
                timeout_secs = self.worker_config.drain_timeout.as_secs(),
                "In-flight tasks did not drain before timeout"
            );
        }

        *self.state.write().await = ControllerState::Stopped;
        info!("Worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::agent::ProfileAgent;
    use crate::queue::MemoryBroker;
    use crate::store::MemoryStore;

    fn controller(broker: &Arc<MemoryBroker>) -> WorkerController {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ProfileAgent::new(Duration::ZERO)));
        WorkerController::new(
            Arc::new(MemoryStore::new(Duration::from_secs(60))),
            Arc::new(broker.source("task.requests")),
            broker.clone(),
            Arc::new(registry),
            WorkerConfig {
                idle_backoff: Duration::from_millis(5),
                ..WorkerConfig::default()
            },
            QueueConfig::default(),
        )
    }

    #[tokio::test]
    async fn start_and_shutdown_cycle() {
        let broker = Arc::new(MemoryBroker::new());
        let ctrl = controller(&broker);
        assert_eq!(ctrl.state().await, ControllerState::Stopped);

        ctrl.start().await.unwrap();
        assert_eq!(ctrl.state().await, ControllerState::Running);

        ctrl.shutdown().await.unwrap();
        assert_eq!(ctrl.state().await, ControllerState::Stopped);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let broker = Arc::new(MemoryBroker::new());
        let ctrl = controller(&broker);
        ctrl.start().await.unwrap();
        assert!(matches!(
            ctrl.start().await,
            Err(WorkerError::AlreadyStarted)
        ));
        ctrl.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_when_stopped_is_rejected() {
        let broker = Arc::new(MemoryBroker::new());
        let ctrl = controller(&broker);
        assert!(matches!(ctrl.shutdown().await, Err(WorkerError::NotRunning)));
    }

    #[tokio::test]
    async fn restart_after_shutdown() {
        let broker = Arc::new(MemoryBroker::new());
        let ctrl = controller(&broker);
        ctrl.start().await.unwrap();
        ctrl.shutdown().await.unwrap();
        ctrl.start().await.unwrap();
        assert_eq!(ctrl.state().await, ControllerState::Running);
        ctrl.shutdown().await.unwrap();
    }
}
