//! Errors surfaced by the retry layer.

use thiserror::Error;

use crate::http::ReplayError;
use crate::lifecycle::Interrupt;
use crate::BoxError;

/// Final outcome of a failed call.
///
/// Only the last attempt's classification is ever reported; intermediate
/// failures stay inside the attempt loop.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The request body could not be re-supplied for an attempt.
    #[error("failed reading body for retry: {0}")]
    BodyReplay(#[source] ReplayError),

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The exchange itself failed.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The attempt loop ended without an outcome.
    #[error("maximum retry budget of {0} reached")]
    BudgetExhausted(u32),
}

impl RetryError {
    /// Whether the call ended because of the caller's cancellation or deadline.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RetryError::Cancelled | RetryError::DeadlineExceeded)
    }
}

impl From<Interrupt> for RetryError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => RetryError::Cancelled,
            Interrupt::DeadlineExceeded => RetryError::DeadlineExceeded,
        }
    }
}

impl From<ReplayError> for RetryError {
    fn from(err: ReplayError) -> Self {
        RetryError::BodyReplay(err)
    }
}
