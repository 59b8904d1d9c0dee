//! In-memory broker — process-local topics with visibility-window redelivery.
//!
//! The default transport for the daemon and the test harness. Each topic is
//! a ready queue plus an in-flight map; a received message moves to in-flight
//! under a fresh receipt handle and is reclaimed into the ready queue once
//! its visibility window lapses without an acknowledgment. External brokers
//! bind behind the same [`MessageSource`]/[`MessageSink`] traits.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;
use crate::queue::{Delivery, MessageSink, MessageSource, ReceiptHandle};

#[derive(Debug, Clone)]
struct StoredMessage {
    body: String,
    /// Correlation key, retained for parity with external brokers.
    #[allow(dead_code)]
    key: String,
}

#[derive(Debug)]
struct InFlight {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct TopicState {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<ReceiptHandle, InFlight>,
}

impl TopicState {
    /// Move deliveries whose visibility window has lapsed back to ready.
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<ReceiptHandle> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(r, _)| r.clone())
            .collect();
        for receipt in expired {
            if let Some(flight) = self.in_flight.remove(&receipt) {
                debug!(receipt = %receipt, "Visibility window lapsed, message redeliverable");
                self.ready.push_back(flight.message);
            }
        }
    }
}

/// Topic-partitioned in-memory message broker.
#[derive(Default)]
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, TopicState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a [`MessageSource`] view onto one topic of this broker.
    pub fn source(self: &Arc<Self>, topic: &str) -> MemorySource {
        MemorySource {
            broker: Arc::clone(self),
            topic: topic.to_string(),
        }
    }

    /// Number of messages ready for delivery on `topic`.
    pub async fn ready_depth(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .await
            .get(topic)
            .map_or(0, |s| s.ready.len())
    }

    /// Number of claimed-but-unacknowledged messages on `topic`.
    pub async fn in_flight_depth(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .await
            .get(topic)
            .map_or(0, |s| s.in_flight.len())
    }

    async fn receive_from(
        &self,
        topic: &str,
        max_count: usize,
        invisible: Duration,
    ) -> Vec<Delivery> {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        let now = Instant::now();
        state.reclaim_expired(now);

        let mut batch = Vec::new();
        while batch.len() < max_count {
            let Some(message) = state.ready.pop_front() else {
                break;
            };
            let receipt = ReceiptHandle::new(Uuid::new_v4().to_string());
            state.in_flight.insert(
                receipt.clone(),
                InFlight {
                    message: message.clone(),
                    visible_at: now + invisible,
                },
            );
            batch.push(Delivery {
                receipt,
                body: message.body,
            });
        }
        batch
    }

    async fn acknowledge_in(&self, topic: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut topics = self.topics.lock().await;
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        state
            .in_flight
            .remove(receipt)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))
    }
}

#[async_trait]
impl MessageSink for MemoryBroker {
    async fn send(&self, topic: &str, body: String, key: &str) -> Result<(), QueueError> {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        state.ready.push_back(StoredMessage {
            body,
            key: key.to_string(),
        });
        debug!(topic, key, depth = state.ready.len(), "Message enqueued");
        Ok(())
    }
}

/// [`MessageSource`] bound to a single topic of a [`MemoryBroker`].
pub struct MemorySource {
    broker: Arc<MemoryBroker>,
    topic: String,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn receive(
        &self,
        max_count: usize,
        invisible: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        Ok(self.broker.receive_from(&self.topic, max_count, invisible).await)
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.broker.acknowledge_in(&self.topic, receipt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn receive_respects_batch_cap() {
        let broker = Arc::new(MemoryBroker::new());
        for i in 0..5 {
            broker
                .send("t", format!("m{i}"), &format!("k{i}"))
                .await
                .unwrap();
        }
        let source = broker.source("t");

        let batch = source.receive(3, WINDOW).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(broker.ready_depth("t").await, 2);
        assert_eq!(broker.in_flight_depth("t").await, 3);
    }

    #[tokio::test]
    async fn acknowledge_consumes_receipt_once() {
        let broker = Arc::new(MemoryBroker::new());
        broker.send("t", "m".into(), "k").await.unwrap();
        let source = broker.source("t");

        let batch = source.receive(1, WINDOW).await.unwrap();
        let receipt = &batch[0].receipt;
        source.acknowledge(receipt).await.unwrap();
        assert_eq!(broker.in_flight_depth("t").await, 0);

        // Second consume of the same handle fails.
        assert!(matches!(
            source.acknowledge(receipt).await,
            Err(QueueError::UnknownReceipt(_))
        ));
    }

    #[tokio::test]
    async fn unacknowledged_message_redelivers_after_window() {
        let broker = Arc::new(MemoryBroker::new());
        broker.send("t", "m".into(), "k").await.unwrap();
        let source = broker.source("t");

        let window = Duration::from_millis(20);
        let first = source.receive(1, window).await.unwrap();
        assert_eq!(first.len(), 1);

        // Still invisible.
        assert!(source.receive(1, window).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = source.receive(1, window).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].body, "m");
        // Redelivery carries a fresh handle.
        assert_ne!(second[0].receipt, first[0].receipt);
    }

    #[tokio::test]
    async fn acknowledged_message_never_redelivers() {
        let broker = Arc::new(MemoryBroker::new());
        broker.send("t", "m".into(), "k").await.unwrap();
        let source = broker.source("t");

        let window = Duration::from_millis(10);
        let batch = source.receive(1, window).await.unwrap();
        source.acknowledge(&batch[0].receipt).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(source.receive(1, window).await.unwrap().is_empty());
        assert_eq!(broker.ready_depth("t").await, 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let broker = Arc::new(MemoryBroker::new());
        broker.send("a", "ma".into(), "k").await.unwrap();
        broker.send("b", "mb".into(), "k").await.unwrap();

        let batch = broker.source("a").receive(10, WINDOW).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "ma");
        assert_eq!(broker.ready_depth("b").await, 1);
    }
}
