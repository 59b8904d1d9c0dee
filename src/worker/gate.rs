//! Admission gate — bounded permit pool for concurrent task execution.
//!
//! The gate is the only state shared by every in-flight processor. Permits
//! are owned values released on drop, so the release path survives early
//! returns and panics alike; the internal lock is never held across an
//! await — only the logical permit count is.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::WorkerError;

/// Counting permit pool of fixed capacity.
#[derive(Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted task's permit. Dropping it returns the permit to the gate.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remaining permits — the consumer loop's batch-sizing input.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Number of currently admitted tasks.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    /// Wait for a permit. Suspends the caller without blocking unrelated
    /// tasks; fulfillment is FIFO-ish with no stronger fairness guarantee.
    pub async fn acquire(&self) -> Result<AdmissionPermit, WorkerError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::GateClosed)?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Non-blocking acquire — the per-message saturation re-check.
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Wait until every permit has been returned, up to `timeout`.
    ///
    /// Returns `true` when the gate fully drained. The briefly-held full
    /// acquisition is dropped immediately, restoring capacity.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let all = Arc::clone(&self.permits).acquire_many_owned(self.capacity as u32);
        match tokio::time::timeout(timeout, all).await {
            Ok(Ok(_permits)) => true,
            Ok(Err(_)) => true, // closed gate has nothing in flight
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capacity_bookkeeping() {
        let gate = AdmissionGate::new(2);
        assert_eq!(gate.capacity(), 2);
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.in_flight(), 0);

        let first = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.in_flight(), 1);

        let second = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);

        drop(first);
        assert_eq!(gate.available(), 1);
        drop(second);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn try_acquire_fails_when_saturated() {
        let gate = AdmissionGate::new(1);
        let held = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
        drop(held);
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn admitted_tasks_never_exceed_capacity() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use futures::future::join_all;

        let gate = AdmissionGate::new(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let gate = gate.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for result in join_all(handles).await {
            result.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_permits() {
        let gate = AdmissionGate::new(3);
        let permit = gate.acquire().await.unwrap();

        let release_gate = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(permit);
            drop(release_gate);
        });

        assert!(gate.drain(Duration::from_secs(1)).await);
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test]
    async fn drain_times_out_when_permits_are_stuck() {
        let gate = AdmissionGate::new(1);
        let _held = gate.acquire().await.unwrap();
        assert!(!gate.drain(Duration::from_millis(30)).await);
    }
}
