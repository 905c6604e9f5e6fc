//! Process-wide counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    requests_accepted: AtomicU64,
    requests_failed: AtomicU64,
    requests_forwarded: AtomicU64,
    encodes_completed: AtomicU64,
    encodes_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_accepted(&self) {
        self.requests_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "requests_accepted", "Metric incremented");
    }

    pub fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "requests_failed", "Metric incremented");
    }

    pub fn request_forwarded(&self) {
        self.requests_forwarded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "requests_forwarded", "Metric incremented");
    }

    pub fn encode_completed(&self) {
        self.encodes_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "encodes_completed", "Metric incremented");
    }

    pub fn encode_failed(&self) {
        self.encodes_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "encodes_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_accepted: self.requests_accepted.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_forwarded: self.requests_forwarded.load(Ordering::Relaxed),
            encodes_completed: self.encodes_completed.load(Ordering::Relaxed),
            encodes_failed: self.encodes_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_accepted: u64,
    pub requests_failed: u64,
    pub requests_forwarded: u64,
    pub encodes_completed: u64,
    pub encodes_failed: u64,
}
