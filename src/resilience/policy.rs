//! Retry policy.
//!
//! # Responsibilities
//! - Hold the attempt budget, backoff, decider and discarder for a client
//! - Build from configuration, rejecting bad values up front
//! - Answer the per-request eligibility question
//!
//! # Design Decisions
//! - Immutable after construction; cloning shares one `Arc`
//! - No process-wide default instance exists; every client builds its own

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::request::Parts;
use http::{HeaderMap, Method, StatusCode};

use crate::config::schema::{BackoffStrategy, RetryConfig};
use crate::config::validation::{check_jitter, validate_retry_config};
use crate::config::{ConfigError, ValidationError};
use crate::http::request::ForceRetry;
use crate::resilience::backoff::{apply_jitter, Backoff, Exponential, Linear};
use crate::resilience::decider::{IdempotentMethods, RetryDecider};
use crate::resilience::discarder::{ResponseDiscarder, StatusCodes};

/// Default attempt budget, the first attempt included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default linear backoff step.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Shared, read-only retry configuration.
#[derive(Clone)]
pub struct RetryPolicy {
    inner: Arc<Inner>,
}

struct Inner {
    max_attempts: u32,
    backoff: Box<dyn Backoff>,
    jitter_ratio: f64,
    decider: Box<dyn RetryDecider>,
    discarder: Box<dyn ResponseDiscarder>,
    buffer_limit: usize,
    drain_limit: usize,
    metrics_enabled: bool,
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Build a policy from the `[retries]` configuration section.
    pub fn from_config(config: &RetryConfig) -> Result<Self, ConfigError> {
        RetryPolicyBuilder::from_config(config).build()
    }

    pub fn max_attempts(&self) -> u32 {
        self.inner.max_attempts
    }

    /// Wait before attempt `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        apply_jitter(self.inner.backoff.delay(attempt), self.inner.jitter_ratio)
    }

    /// Whether a request may be retried: forced, or accepted by the decider.
    pub fn is_eligible(&self, parts: &Parts) -> bool {
        parts.extensions.get::<ForceRetry>().is_some() || self.inner.decider.decide(parts)
    }

    pub fn discards(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        self.inner.discarder.discard(status, headers)
    }

    pub fn buffer_limit(&self) -> usize {
        self.inner.buffer_limit
    }

    pub fn drain_limit(&self) -> usize {
        self.inner.drain_limit
    }

    pub fn metrics_enabled(&self) -> bool {
        self.inner.metrics_enabled
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }
}

impl Default for Inner {
    fn default() -> Self {
        let config = RetryConfig::default();
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Box::new(Linear::new(DEFAULT_BASE_DELAY)),
            jitter_ratio: 0.0,
            decider: Box::new(IdempotentMethods::default()),
            discarder: Box::new(StatusCodes::default()),
            buffer_limit: config.max_buffered_body_bytes,
            drain_limit: config.drain_limit_bytes,
            metrics_enabled: true,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.inner.max_attempts)
            .field("buffer_limit", &self.inner.buffer_limit)
            .field("drain_limit", &self.inner.drain_limit)
            .field("jitter_ratio", &self.inner.jitter_ratio)
            .field("metrics_enabled", &self.inner.metrics_enabled)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryPolicy`]. Unset values keep their defaults.
///
/// Invalid values are collected and reported together by [`build`](Self::build).
#[derive(Default)]
pub struct RetryPolicyBuilder {
    inner: Inner,
    errors: Vec<ValidationError>,
}

impl RetryPolicyBuilder {
    /// Start from the `[retries]` configuration section.
    ///
    /// Validation problems are reported by [`build`](Self::build).
    pub fn from_config(config: &RetryConfig) -> Self {
        let mut errors = match validate_retry_config(config) {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        let methods = config
            .retriable_methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.as_bytes()).ok());
        let codes = config
            .discard_status_codes
            .iter()
            .filter_map(|&c| StatusCode::from_u16(c).ok());

        let backoff = &config.backoff;
        let base = Duration::from_millis(backoff.base_delay_ms);
        let mut builder = RetryPolicyBuilder::default()
            .max_attempts(config.max_attempts)
            .decider(IdempotentMethods::new(methods))
            .discarder(StatusCodes::new(codes))
            .max_buffered_body_bytes(config.max_buffered_body_bytes)
            .drain_limit_bytes(config.drain_limit_bytes);

        // Jitter and delay bounds were checked above; set them without re-checking.
        if errors.is_empty() {
            builder.inner.jitter_ratio = backoff.jitter_ratio;
            builder = match backoff.strategy {
                BackoffStrategy::Linear => builder.backoff(Linear::new(base)),
                BackoffStrategy::Exponential => {
                    builder.exponential_backoff(base, Duration::from_millis(backoff.max_delay_ms))
                }
            };
        }

        builder.errors.append(&mut errors);
        builder
    }

    /// Attempt budget, the first attempt included. 0 disables retries.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.inner.max_attempts = max_attempts;
        self
    }

    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.inner.backoff = Box::new(backoff);
        self
    }

    /// `base * 2^(attempt - 1)` capped at `max`.
    pub fn exponential_backoff(mut self, base: Duration, max: Duration) -> Self {
        match Exponential::new(base, max) {
            Ok(backoff) => self.inner.backoff = Box::new(backoff),
            Err(e) => self.errors.push(e),
        }
        self
    }

    /// Extra random delay of up to `ratio` times each computed delay.
    pub fn jitter(mut self, ratio: f64) -> Self {
        match check_jitter(ratio) {
            Ok(()) => self.inner.jitter_ratio = ratio,
            Err(e) => self.errors.push(e),
        }
        self
    }

    pub fn decider(mut self, decider: impl RetryDecider + 'static) -> Self {
        self.inner.decider = Box::new(decider);
        self
    }

    pub fn discarder(mut self, discarder: impl ResponseDiscarder + 'static) -> Self {
        self.inner.discarder = Box::new(discarder);
        self
    }

    /// Largest streaming body buffered for replay. 0 disables buffering.
    pub fn max_buffered_body_bytes(mut self, limit: usize) -> Self {
        self.inner.buffer_limit = limit;
        self
    }

    pub fn drain_limit_bytes(mut self, limit: usize) -> Self {
        self.inner.drain_limit = limit;
        self
    }

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.inner.metrics_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<RetryPolicy, ConfigError> {
        if !self.errors.is_empty() {
            return Err(ConfigError::Validation(self.errors));
        }

        Ok(RetryPolicy {
            inner: Arc::new(self.inner),
        })
    }
}
