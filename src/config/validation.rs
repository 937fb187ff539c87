//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (status codes, jitter ratio, delay bounds)
//! - Check that configured methods are valid HTTP method tokens
//! - Check that the log level names a tracing level
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RetryConfig → Result<(), Vec<ValidationError>>
//! - Runs at construction time, never at call time

use http::Method;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::config::schema::{BackoffStrategy, ClientConfig, ObservabilityConfig, RetryConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid HTTP method '{0}' in retriable_methods")]
    InvalidMethod(String),

    #[error("status code {0} in discard_status_codes is outside 100..=599")]
    InvalidStatusCode(u16),

    #[error("jitter_ratio {0} must be a finite number between 0 and 1")]
    InvalidJitter(f64),

    #[error("max_delay_ms ({max_ms}) is below base_delay_ms ({base_ms})")]
    DelayBoundsInverted { base_ms: u64, max_ms: u64 },

    #[error("log_level '{0}' is not one of trace, debug, info, warn, error, off")]
    InvalidLogLevel(String),
}

/// Validate a full client configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_retry_config(&config.retries).err().unwrap_or_default();
    errors.extend(validate_observability_config(&config.observability).err());

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_observability_config(config: &ObservabilityConfig) -> Result<(), ValidationError> {
    match config.log_level.parse::<LevelFilter>() {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::InvalidLogLevel(config.log_level.clone())),
    }
}

/// Validate the retry section only.
pub fn validate_retry_config(config: &RetryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for method in &config.retriable_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod(method.clone()));
        }
    }

    for &code in &config.discard_status_codes {
        if !(100..=599).contains(&code) {
            errors.push(ValidationError::InvalidStatusCode(code));
        }
    }

    let backoff = &config.backoff;
    if let Err(e) = check_jitter(backoff.jitter_ratio) {
        errors.push(e);
    }
    if backoff.strategy == BackoffStrategy::Exponential {
        if let Err(e) = check_delay_bounds(backoff.base_delay_ms, backoff.max_delay_ms) {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub(crate) fn check_jitter(ratio: f64) -> Result<(), ValidationError> {
    if ratio.is_finite() && (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(ValidationError::InvalidJitter(ratio))
    }
}

pub(crate) fn check_delay_bounds(base_ms: u64, max_ms: u64) -> Result<(), ValidationError> {
    if max_ms < base_ms {
        Err(ValidationError::DelayBoundsInverted { base_ms, max_ms })
    } else {
        Ok(())
    }
}
