//! Message queue abstractions — delivery envelope, source, and sink.
//!
//! The queue guarantees at-least-once delivery: a message that is received
//! but not acknowledged within its visibility window becomes redeliverable
//! to any consumer in the group. Everything downstream is designed around
//! that — the same task id may arrive more than once.
//!
//! Both traits are async; an adapter over a blocking client must offload
//! its calls (`tokio::task::spawn_blocking`) so they never stall the
//! scheduler driving the consumer loop.

pub mod memory;

pub use memory::MemoryBroker;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;

/// Opaque acknowledgment handle for one delivery.
///
/// Each delivery (including a redelivery of the same message) carries a
/// fresh handle, and a handle is consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One delivered message: the serialized body plus its receipt handle.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: ReceiptHandle,
    pub body: String,
}

/// Consuming side of the queue.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Receive up to `max_count` messages, hiding each from other consumers
    /// for `invisible`. May return an empty batch; never blocks indefinitely.
    async fn receive(
        &self,
        max_count: usize,
        invisible: Duration,
    ) -> Result<Vec<Delivery>, QueueError>;

    /// Consume a delivery's receipt handle, removing the message from
    /// future redelivery.
    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;
}

/// Producing side of the queue.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Publish a message body to `topic`, keyed for correlation.
    async fn send(&self, topic: &str, body: String, key: &str) -> Result<(), QueueError>;
}
