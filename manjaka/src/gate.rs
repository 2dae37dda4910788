//! Bounded concurrency for outbound requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use manjaka_core::ApiError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::trace;

use crate::metrics;

/// Caps the number of simultaneous outbound requests.
///
/// Callers over the cap queue in arrival order and are admitted as permits are
/// released. A permit is held for the whole lifetime of a request, retries
/// included, so a retrying request never goes back to the end of the queue.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    queued: Arc<AtomicUsize>,
}

/// Admission to the gate. The slot is released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

struct QueuedGuard<'a>(&'a AtomicUsize);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    /// Creates a gate admitting at most `capacity` requests at once.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<GatePermit, ApiError> {
        let started = Instant::now();
        self.queued.fetch_add(1, Ordering::SeqCst);
        let guard = QueuedGuard(&self.queued);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::Aborted)?;
        drop(guard);

        let waited = started.elapsed();
        trace!(
            waited_ms = waited.as_millis() as u64,
            active = self.active(),
            "concurrency permit acquired"
        );
        metrics::record_gate_wait(waited);
        Ok(GatePermit { _permit: permit })
    }

    /// Maximum number of simultaneous requests.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests currently holding a permit.
    pub fn active(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Requests waiting for a permit.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_queue_is_fifo() {
        let gate = ConcurrencyGate::new(1);
        let first = gate.acquire().await.unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for n in 0..3 {
            let gate = gate.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                order.lock().unwrap().push(n);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
            // Let each task enqueue before spawning the next.
            tokio::task::yield_now().await;
        }

        assert_eq!(gate.queued(), 3);
        assert_eq!(gate.active(), 1);
        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(gate.active(), 0);
        assert_eq!(gate.queued(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_queue() {
        let gate = ConcurrencyGate::new(1);
        let _held = gate.acquire().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(5), gate.acquire()).await;
        assert!(waiting.is_err());
        assert_eq!(gate.queued(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        assert_eq!(ConcurrencyGate::new(0).capacity(), 1);
    }
}
