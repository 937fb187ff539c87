//! Response rejection.
//!
//! A discarder sees only the status line and headers, so it cannot consume
//! a body that may end up being returned to the caller.

use std::collections::HashSet;

use http::{HeaderMap, StatusCode};

/// Decides whether a completed response should be thrown away and retried.
pub trait ResponseDiscarder: Send + Sync {
    fn discard(&self, status: StatusCode, headers: &HeaderMap) -> bool;
}

impl<F> ResponseDiscarder for F
where
    F: Fn(StatusCode, &HeaderMap) -> bool + Send + Sync,
{
    fn discard(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        self(status, headers)
    }
}

/// Discards responses whose status is in a fixed set.
#[derive(Debug, Clone)]
pub struct StatusCodes {
    codes: HashSet<StatusCode>,
}

impl StatusCodes {
    pub fn new(codes: impl IntoIterator<Item = StatusCode>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }
}

impl Default for StatusCodes {
    /// 500, 503 and 504.
    fn default() -> Self {
        Self::new([
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ])
    }
}

impl ResponseDiscarder for StatusCodes {
    fn discard(&self, status: StatusCode, _headers: &HeaderMap) -> bool {
        self.codes.contains(&status)
    }
}
