//! Request-side metadata read by the retry layer.
//!
//! # Responsibilities
//! - Mark a single request as retriable regardless of the decider
//! - Attach the call's cancellation scope to a request
//!
//! # Design Decisions
//! - Both live in `http::Extensions`, so they cross API boundaries without
//!   extra parameters
//! - The force-retry flag belongs to the request, not to the `CallContext`;
//!   other requests sharing the same cancellation scope do not inherit it
//! - There is no way to clear the flag once set

use http::Request;

use crate::lifecycle::CallContext;

/// Marker extension: retry this request even if the decider says no.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceRetry;

/// Extension methods for requests sent through the retry layer.
pub trait RetryRequestExt {
    /// Turn on retries for this request regardless of the decider.
    ///
    /// Only do this for requests that are safe to repeat.
    fn force_retry(self) -> Self;

    /// True if [`force_retry`](RetryRequestExt::force_retry) was applied.
    fn is_retry_forced(&self) -> bool;

    /// Attach the cancellation scope of the logical call.
    fn with_call_context(self, ctx: CallContext) -> Self;

    /// The attached cancellation scope, if any.
    fn call_context(&self) -> Option<&CallContext>;
}

impl<B> RetryRequestExt for Request<B> {
    fn force_retry(mut self) -> Self {
        if !self.is_retry_forced() {
            self.extensions_mut().insert(ForceRetry);
        }
        self
    }

    fn is_retry_forced(&self) -> bool {
        self.extensions().get::<ForceRetry>().is_some()
    }

    fn with_call_context(mut self, ctx: CallContext) -> Self {
        self.extensions_mut().insert(ctx);
        self
    }

    fn call_context(&self) -> Option<&CallContext> {
        self.extensions().get::<CallContext>()
    }
}

/// Free-function form of [`RetryRequestExt::force_retry`].
pub fn force_retry<B>(req: Request<B>) -> Request<B> {
    req.force_retry()
}
