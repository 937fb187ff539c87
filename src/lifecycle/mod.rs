//! Call lifecycle: cancellation and deadlines.
//!
//! # Data Flow
//! ```text
//! Caller:
//!     CallContext::new().with_timeout(..) → attached to the request
//!
//! Orchestrator (every suspension point):
//!     backoff wait / exchange / discard drain
//!     raced against CallContext::interrupted()
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl-C) → CancellationToken::cancel()
//! ```
//!
//! # Design Decisions
//! - A deadline always wins over the remaining retry budget
//! - Requests without a context are never interrupted by this layer
//! - Child contexts share cancellation, nothing else

pub mod context;
pub mod signals;

pub use context::{CallContext, Interrupt};
