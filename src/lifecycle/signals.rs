//! OS signal handling.
//!
//! # Responsibilities
//! - Translate SIGINT (Ctrl-C) into cancellation of in-flight calls
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Cancels a token instead of exiting, so the retry loop stops at its next
//!   suspension point and reports `request cancelled`

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `token` when Ctrl-C is received.
///
/// The returned task finishes after cancelling, or immediately if the
/// token is cancelled by someone else first.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => {
                    tracing::info!("Interrupt received, cancelling request");
                    token.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "Failed to install Ctrl-C handler"),
            },
            _ = token.cancelled() => {}
        }
    })
}
