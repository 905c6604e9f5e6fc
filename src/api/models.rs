//! Response bodies produced by the gateway itself.
//!
//! Forwarded responses are relayed as-is; these types only cover local
//! errors and the diagnostic health endpoint.

use serde::Serialize;

use crate::observability::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Uploads currently holding a temp path
    pub in_flight: usize,
    pub encoders_running: usize,
    pub encoders_waiting: usize,
    pub encoder_limit: usize,
    pub pending_cleanups: usize,
    pub metrics: MetricsSnapshot,
}
