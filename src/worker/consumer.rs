//! Consumer loop — admission-controlled message polling and dispatch.
//!
//! The loop pulls from the message source only when the gate has capacity,
//! sizes each receive batch by the permits actually available, and hands
//! every admitted task to a detached [`TaskProcessor`]. The stop flag is
//! observed cooperatively at iteration boundaries.
//!
//! Acknowledgment policy: acknowledge on claim. A message is acked right
//! after its permit is acquired and before processing starts — redelivery
//! races can never double-process, and the processor's idempotency gate
//! absorbs any duplicate that was already in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::QueueError;
use crate::queue::{Delivery, MessageSource};
use crate::task::TaskMessage;
use crate::worker::gate::AdmissionGate;
use crate::worker::processor::{ProcessorDeps, TaskProcessor};

/// Polls the message source and dispatches tasks under the admission gate.
pub struct ConsumerLoop {
    source: Arc<dyn MessageSource>,
    gate: AdmissionGate,
    deps: ProcessorDeps,
    config: WorkerConfig,
    stop: Arc<AtomicBool>,
}

impl ConsumerLoop {
    pub fn new(
        source: Arc<dyn MessageSource>,
        gate: AdmissionGate,
        deps: ProcessorDeps,
        config: WorkerConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            gate,
            deps,
            config,
            stop,
        }
    }

    /// Spawn the loop as an independent task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        info!(
            capacity = self.gate.capacity(),
            batch_cap = self.config.receive_batch_cap,
            "Consumer loop started"
        );

        while !self.stop.load(Ordering::Relaxed) {
            if let Err(e) = self.poll_once().await {
                // Per-batch containment: log, pause, resume. Never crash.
                warn!(error = %e, "Poll cycle failed, backing off");
                tokio::time::sleep(self.config.error_backoff).await;
            }
        }

        info!("Consumer loop stopped");
    }

    /// One poll cycle: backpressure check, sized receive, dispatch.
    async fn poll_once(&self) -> Result<(), QueueError> {
        let available = self.gate.available();
        if available == 0 {
            // Saturated: stop pulling, let the queue hold the backlog.
            tokio::time::sleep(self.config.idle_backoff).await;
            return Ok(());
        }

        let batch = available.min(self.config.receive_batch_cap);
        let deliveries = self
            .source
            .receive(batch, self.config.visibility_window)
            .await?;

        if deliveries.is_empty() {
            tokio::time::sleep(self.config.idle_backoff).await;
            return Ok(());
        }
        debug!(count = deliveries.len(), "Received messages");

        for delivery in deliveries {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            if !self.dispatch(delivery).await {
                // Saturated mid-batch: the rest stays claimed by the queue
                // and redelivers after the visibility window.
                break;
            }
        }

        Ok(())
    }

    /// Admit, claim, and dispatch one delivery.
    ///
    /// Returns `false` when the gate is saturated and the caller should
    /// abandon the rest of the batch.
    async fn dispatch(&self, delivery: Delivery) -> bool {
        // Capacity may have been consumed since the batch was sized.
        let Some(permit) = self.gate.try_acquire() else {
            warn!("Admission gate saturated, leaving remaining messages for redelivery");
            return false;
        };

        let task: TaskMessage = match serde_json::from_str(&delivery.body) {
            Ok(task) => task,
            Err(e) => {
                // Poison message: it can never succeed, and leaving it
                // unacknowledged would redeliver it forever.
                warn!(receipt = %delivery.receipt, error = %e, "Dropping undecodable message");
                if let Err(ack_err) = self.source.acknowledge(&delivery.receipt).await {
                    warn!(receipt = %delivery.receipt, error = %ack_err, "Failed to acknowledge poison message");
                }
                drop(permit);
                return true;
            }
        };

        // Claim ownership before processing begins.
        if let Err(e) = self.source.acknowledge(&delivery.receipt).await {
            warn!(
                task_id = %task.task_id,
                error = %e,
                "Acknowledge failed, a duplicate delivery is possible"
            );
        }

        info!(
            task_id = %task.task_id,
            agent_type = %task.agent_type,
            in_flight = self.gate.in_flight(),
            capacity = self.gate.capacity(),
            "Task admitted"
        );

        let processor = TaskProcessor::new(task, self.deps.clone());
        tokio::spawn(async move {
            processor.run(permit).await;
        });
        true
    }
}
