//! Configuration schema definitions.
//!
//! This module defines the configuration structure for a retrying client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for a retrying HTTP client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Retry policy settings.
    pub retries: RetryConfig,

    /// Per-call timeout settings.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per call, the first included. 0 disables retries.
    pub max_attempts: u32,

    /// Delay between attempts.
    pub backoff: BackoffConfig,

    /// Methods considered safe to repeat.
    pub retriable_methods: Vec<String>,

    /// Response status codes that are discarded and retried.
    pub discard_status_codes: Vec<u16>,

    /// Largest streaming body buffered in memory for replay. 0 disables buffering.
    pub max_buffered_body_bytes: usize,

    /// Bytes read from a discarded response before dropping it.
    pub drain_limit_bytes: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            retriable_methods: vec!["GET".into(), "HEAD".into(), "OPTIONS".into()],
            discard_status_codes: vec![500, 503, 504],
            max_buffered_body_bytes: 2 * 1024 * 1024, // 2MB
            drain_limit_bytes: 64 * 1024,
        }
    }
}

/// Backoff shape between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `attempt * base_delay`.
    Linear,
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    Exponential,
}

/// Backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Backoff shape.
    pub strategy: BackoffStrategy,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Extra random delay as a fraction of the computed delay (0.0 to 1.0).
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            jitter_ratio: 0.0,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for one logical call, retries included, in milliseconds. 0 means none.
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_ms: 30_000 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Record retry metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}
