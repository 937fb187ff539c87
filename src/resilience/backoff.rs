//! Backoff between attempts.
//!
//! A backoff is a pure function of the attempt index: `delay(1)` is the wait
//! before the second attempt. There is never a wait before the first one.

use std::time::Duration;

use rand::Rng;

use crate::config::validation::check_delay_bounds;
use crate::config::ValidationError;

/// Wait before attempt `attempt + 1`.
///
/// Implementations hold no mutable state, so one instance can serve any
/// number of concurrent calls.
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// `attempt * base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linear {
    base: Duration,
}

impl Linear {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }
}

impl Backoff for Linear {
    fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt)
    }
}

/// `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exponential {
    base: Duration,
    max: Duration,
}

impl Exponential {
    pub fn new(base: Duration, max: Duration) -> Result<Self, ValidationError> {
        check_delay_bounds(base.as_millis() as u64, max.as_millis() as u64)?;
        Ok(Self { base, max })
    }
}

impl Backoff for Exponential {
    fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(attempt - 1);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Add a random extra delay of up to `ratio` times `delay`.
///
/// `ratio` must already have passed validation.
pub(crate) fn apply_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio == 0.0 || delay.is_zero() {
        return delay;
    }

    let jitter = rand::thread_rng().gen_range(0.0..=ratio);
    delay.saturating_add(delay.mul_f64(jitter))
}
