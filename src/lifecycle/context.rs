//! Cancellation and deadline signal for a single logical call.
//!
//! # Responsibilities
//! - Carry a cancellation token and an optional deadline with a request
//! - Race waits and exchanges against both
//! - Report which of the two fired
//!
//! # Design Decisions
//! - Uses `tokio_util::sync::CancellationToken` for cancellation
//! - Deadlines are `tokio::time::Instant` so paused-time tests stay deterministic
//! - Tightening only: a deadline can be moved earlier, never later

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Reason a call stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The caller cancelled the call.
    Cancelled,
    /// The call's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Cancelled => write!(f, "request cancelled"),
            Interrupt::DeadlineExceeded => write!(f, "request deadline exceeded"),
        }
    }
}

impl std::error::Error for Interrupt {}

/// Cancellation scope of one logical call.
///
/// Attach it to a request with
/// [`RetryRequestExt::with_call_context`](crate::http::RetryRequestExt::with_call_context).
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Use an existing token, e.g. one shared with other calls.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Set a deadline `timeout` from now, unless an earlier one is already set.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Set an absolute deadline, unless an earlier one is already set.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a context for a related call.
    ///
    /// Cancelling the parent cancels the child; the child can be cancelled
    /// on its own. The deadline is inherited.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Non-blocking check of both signals.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.token.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupt::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves once the call is cancelled or its deadline passes.
    pub async fn interrupted(&self) -> Interrupt {
        let deadline = async {
            match self.deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Interrupt::Cancelled,
            _ = deadline => Interrupt::DeadlineExceeded,
        }
    }

    /// Drive `fut` to completion unless the call is interrupted first.
    ///
    /// An already-interrupted context never polls `fut`.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupt>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            interrupt = self.interrupted() => Err(interrupt),
            output = fut => Ok(output),
        }
    }

    /// Sleep for `duration`, waking early on interruption.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        if duration.is_zero() {
            return self.check();
        }
        self.run(time::sleep(duration)).await
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
