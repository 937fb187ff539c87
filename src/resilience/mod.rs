//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request<RetryBody> (from caller or RetryService::call)
//!     → policy.rs (eligible? force-retry marker, then decider.rs)
//!     → orchestrator.rs attempt loop
//!         → backoff.rs (wait before attempts 2..N, raced against the CallContext)
//!         → http/replay.rs (fresh body per attempt)
//!         → send one exchange (closure or inner tower service)
//!         → discarder.rs (status + headers only)
//!     → Response<B> or error.rs RetryError
//! ```
//!
//! # Design Decisions
//! - Retries only for idempotent requests (GET, HEAD, OPTIONS) unless forced
//! - A policy is built once per client and shared read-only across calls
//! - The caller's deadline is non-negotiable; no wait outlives it
//! - All resilience logic is composable middleware (see `layer.rs`)

pub mod backoff;
pub mod decider;
pub mod discarder;
pub mod error;
pub mod layer;
pub mod orchestrator;
pub mod policy;

pub use backoff::{Backoff, Exponential, Linear};
pub use decider::{IdempotentMethods, RetryDecider};
pub use discarder::{ResponseDiscarder, StatusCodes};
pub use error::RetryError;
pub use layer::{RetryLayer, RetryService};
pub use orchestrator::execute;
pub use policy::{RetryPolicy, RetryPolicyBuilder};
