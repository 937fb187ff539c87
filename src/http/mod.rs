//! HTTP message handling for the retry layer.
//!
//! # Data Flow
//! ```text
//! Request<RetryBody>
//!     → request.rs (force-retry flag, call context)
//!     → replay.rs (resolve replay route once per call)
//!     → body.rs (fresh body per attempt)
//!     → [transport performs one exchange]
//!     → response.rs (drain and drop discarded responses)
//! ```

pub mod body;
pub mod replay;
pub mod request;
pub mod response;

pub use body::RetryBody;
pub use replay::{ReplayError, ReplaySource, Resolution};
pub use request::{force_retry, ForceRetry, RetryRequestExt};
pub use response::{release, Released};
