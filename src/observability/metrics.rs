//! Metrics collection.
//!
//! # Metrics
//! - `pool_requests_total` (counter): submissions by service, outcome
//! - `pool_open_connections` (gauge): established connections per service
//! - `pool_pending_connections` (gauge): connections mid-handshake per service
//! - `pool_queue_depth` (gauge): queued acquire requests per service
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; exposition belongs to the
//!   embedding application
//! - Low-overhead updates, labels limited to service and outcome

use metrics::{counter, gauge};

/// Outcome label values for `pool_requests_total`.
pub mod outcome {
    pub const DISPATCHED: &str = "dispatched";
    pub const REJECTED: &str = "rejected";
    pub const ACQUIRE_TIMEOUT: &str = "acquire_timeout";
    pub const CONNECT_FAILED: &str = "connect_failed";
    pub const SHUTDOWN: &str = "shutdown";
}

pub(crate) fn record_request(service: &str, outcome: &'static str) {
    counter!(
        "pool_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub(crate) fn connection_opened(service: &str) {
    gauge!("pool_open_connections", "service" => service.to_string()).increment(1.0);
}

pub(crate) fn connection_closed(service: &str) {
    gauge!("pool_open_connections", "service" => service.to_string()).decrement(1.0);
}

pub(crate) fn connection_pending(service: &str, delta: f64) {
    gauge!("pool_pending_connections", "service" => service.to_string()).increment(delta);
}

pub(crate) fn queue_depth(service: &str, depth: usize) {
    gauge!("pool_queue_depth", "service" => service.to_string()).set(depth as f64);
}
