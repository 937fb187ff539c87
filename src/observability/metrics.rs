//! Retry metrics.
//!
//! # Metrics
//! - `http_retry_attempts_total` (counter): exchanges issued, by method
//! - `http_retry_calls_total` (counter): finished calls, by method and outcome
//! - `http_retry_backoff_seconds` (histogram): waits applied between attempts
//! - `http_retry_drain_failures_total` (counter): discarded responses whose
//!   body failed mid-drain
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; the embedding application installs
//!   the exporter
//! - Methods are labels, never URIs, to keep cardinality bounded

use std::time::Duration;

use http::Method;

pub const ATTEMPTS_TOTAL: &str = "http_retry_attempts_total";
pub const CALLS_TOTAL: &str = "http_retry_calls_total";
pub const BACKOFF_SECONDS: &str = "http_retry_backoff_seconds";
pub const DRAIN_FAILURES_TOTAL: &str = "http_retry_drain_failures_total";

/// How a logical call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Sent once without retry bookkeeping.
    Single,
    /// Accepted response.
    Success,
    /// Budget used up; last response or error returned.
    Exhausted,
    /// Cancellation or deadline.
    Aborted,
    /// Body could not be re-supplied.
    ReplayFailed,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Single => "single",
            CallOutcome::Success => "success",
            CallOutcome::Exhausted => "exhausted",
            CallOutcome::Aborted => "aborted",
            CallOutcome::ReplayFailed => "replay_failed",
        }
    }
}

pub fn record_attempt(method: &Method) {
    metrics::counter!(ATTEMPTS_TOTAL, "method" => method.to_string()).increment(1);
}

pub fn record_call(method: &Method, outcome: CallOutcome) {
    metrics::counter!(
        CALLS_TOTAL,
        "method" => method.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_backoff(delay: Duration) {
    metrics::histogram!(BACKOFF_SECONDS).record(delay.as_secs_f64());
}

pub fn record_drain_failure(method: &Method) {
    metrics::counter!(DRAIN_FAILURES_TOTAL, "method" => method.to_string()).increment(1);
}
