//! Release of responses the retry layer throws away.
//!
//! # Responsibilities
//! - Drain a discarded response's body so the connection can be reused
//! - Drop the response before the next attempt begins
//!
//! # Design Decisions
//! - Draining stops at a byte limit; past that the connection is simply closed
//! - Drain failures never fail the call

use http::Response;
use http_body::Body;
use http_body_util::BodyExt;

/// How a discarded response body was let go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// Read to the end or to the limit; holds the bytes drained.
    Drained(usize),
    /// The body failed mid-drain; holds the bytes drained before the error.
    Abandoned(usize),
}

/// Drain up to `limit` bytes of `response`'s body, then drop it.
pub async fn release<B>(response: Response<B>, limit: usize) -> Released
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let status = response.status();
    let body = response.into_body();
    let mut body = std::pin::pin!(body);
    let mut drained = 0usize;

    while drained < limit {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(chunk) = frame.data_ref() {
                    drained += bytes::Buf::remaining(chunk);
                }
            }
            Some(Err(e)) => {
                tracing::debug!(
                    status = %status,
                    error = %e,
                    "Failed to drain discarded response; connection will not be reused"
                );
                return Released::Abandoned(drained);
            }
            None => break,
        }
    }

    Released::Drained(drained)
}
