//! Request coordination metrics.
//!
//! Recorded only with the `metrics` feature enabled.
//!
//! ## Metrics
//!
//! - `manjaka_requests_total` - Transport attempts, labelled by `method` and `outcome` (counter)
//! - `manjaka_request_duration_seconds` - Transport attempt latency (histogram)
//! - `manjaka_retries_total` - Retries scheduled, labelled by `status` (counter)
//! - `manjaka_lock_coalesced_total` - Callers that joined an in-flight request (counter)
//! - `manjaka_lock_stale_total` - Locks replaced after exceeding the lock timeout (counter)
//! - `manjaka_gate_wait_seconds` - Time spent queued for a concurrency permit (histogram)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

use std::time::Duration;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for transport attempts.
    pub static ref REQUESTS_TOTAL: &'static str = {
        metrics::describe_counter!(
            "manjaka_requests_total",
            "Total number of transport attempts."
        );
        "manjaka_requests_total"
    };
    /// Metric name for transport latency.
    pub static ref REQUEST_DURATION: &'static str = {
        metrics::describe_histogram!(
            "manjaka_request_duration_seconds",
            metrics::Unit::Seconds,
            "Latency of a single transport attempt."
        );
        "manjaka_request_duration_seconds"
    };
    /// Metric name for retries.
    pub static ref RETRIES_TOTAL: &'static str = {
        metrics::describe_counter!(
            "manjaka_retries_total",
            "Total number of retries scheduled after transient failures."
        );
        "manjaka_retries_total"
    };
    /// Metric name for coalesced callers.
    pub static ref LOCK_COALESCED_TOTAL: &'static str = {
        metrics::describe_counter!(
            "manjaka_lock_coalesced_total",
            "Total number of callers that joined an in-flight request."
        );
        "manjaka_lock_coalesced_total"
    };
    /// Metric name for stale locks.
    pub static ref LOCK_STALE_TOTAL: &'static str = {
        metrics::describe_counter!(
            "manjaka_lock_stale_total",
            "Total number of locks replaced after exceeding the lock timeout."
        );
        "manjaka_lock_stale_total"
    };
    /// Metric name for gate queueing time.
    pub static ref GATE_WAIT: &'static str = {
        metrics::describe_histogram!(
            "manjaka_gate_wait_seconds",
            metrics::Unit::Seconds,
            "Time spent waiting for a concurrency permit."
        );
        "manjaka_gate_wait_seconds"
    };
}

/// Record a transport attempt.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_request(method: &str, outcome: &'static str, duration: Duration) {
    metrics::counter!(*REQUESTS_TOTAL, "method" => method.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!(*REQUEST_DURATION, "method" => method.to_string())
        .record(duration.as_secs_f64());
}

/// Record a transport attempt (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_request(_method: &str, _outcome: &'static str, _duration: Duration) {}

/// Record a scheduled retry.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_retry(status: Option<u16>) {
    let status = status.map_or_else(|| "none".to_string(), |code| code.to_string());
    metrics::counter!(*RETRIES_TOTAL, "status" => status).increment(1);
}

/// Record a scheduled retry (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_retry(_status: Option<u16>) {}

/// Record a caller joining an in-flight request.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_coalesced() {
    metrics::counter!(*LOCK_COALESCED_TOTAL).increment(1);
}

/// Record a caller joining an in-flight request (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_coalesced() {}

/// Record a stale lock replacement.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_stale_lock() {
    metrics::counter!(*LOCK_STALE_TOTAL).increment(1);
}

/// Record a stale lock replacement (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_stale_lock() {}

/// Record time spent waiting at the concurrency gate.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_gate_wait(waited: Duration) {
    metrics::histogram!(*GATE_WAIT).record(waited.as_secs_f64());
}

/// Record time spent waiting at the concurrency gate (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_gate_wait(_waited: Duration) {}
