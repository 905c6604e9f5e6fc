//! Admission control for encoder runs
//!
//! Detection, probing and forwarding run unbounded per request; only encoder
//! execution goes through this gate. Waiting is cooperative (a Tokio
//! semaphore), and the permit is released when dropped, including on error
//! paths and cancelled futures.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

#[derive(Debug)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    limit: usize,
    waiting: Arc<AtomicUsize>,
}

/// Held for the duration of one encoder run
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    /// Creates a gate admitting `max_concurrent` runs; zero is coerced to one.
    pub fn new(max_concurrent: usize) -> Self {
        let limit = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of callers currently queued for a slot
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Number of permits currently handed out
    pub fn running(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// Waits for a free encoder slot.
    ///
    /// `label` identifies the caller in logs when it has to queue.
    pub async fn acquire(&self, label: &str) -> AdmissionPermit {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            debug!(label, "Encoder slot acquired immediately");
            return AdmissionPermit { _permit: permit };
        }

        let queued = self.waiting.fetch_add(1, Ordering::Relaxed) + 1;
        info!(label, queued, limit = self.limit, "Waiting for encoder slot");
        let _waiting = WaitingGuard(Arc::clone(&self.waiting));

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            // The semaphore is owned here and never closed.
            .unwrap_or_else(|_| unreachable!("admission semaphore closed"));

        debug!(label, "Encoder slot acquired after waiting");
        AdmissionPermit { _permit: permit }
    }
}

/// Decrements the waiting count even if the acquiring future is dropped
struct WaitingGuard(Arc<AtomicUsize>);

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
