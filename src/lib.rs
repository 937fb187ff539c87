//! Outbound HTTP retry layer.
//!
//! Wraps a "perform one exchange" primitive (a closure or any tower client
//! service) and retries failed or discarded exchanges under a [`RetryPolicy`],
//! while honouring the caller's cancellation and deadline and replaying the
//! request body byte for byte on every attempt.
//!
//! # Architecture Overview
//!
//! ```text
//!     Request<RetryBody>
//!            │
//!            ▼
//!   ┌─────────────────┐   eligible?   ┌──────────────┐
//!   │   RetryLayer /  │──────────────▶│  RetryPolicy │  decider, discarder,
//!   │    execute()    │               │              │  backoff, budget
//!   └────────┬────────┘               └──────────────┘
//!            │ per attempt
//!            ▼
//!   ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐
//!   │ wait (backoff)  │──▶│ ReplaySource    │──▶│ inner client    │
//!   │ vs CallContext  │   │ .obtain()       │   │ (one exchange)  │
//!   └─────────────────┘   └─────────────────┘   └────────┬────────┘
//!            ▲                                           │
//!            └──────── discarded / transport error ──────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use http::Request;
//! use http_retry::{RetryBody, RetryLayer, RetryPolicy};
//! use hyper_util::client::legacy::Client;
//! use hyper_util::rt::TokioExecutor;
//! use tower::{Layer, ServiceExt};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder(TokioExecutor::new()).build_http::<RetryBody>();
//! let policy = RetryPolicy::builder().max_attempts(5).build()?;
//! let svc = RetryLayer::new(policy).layer(client);
//!
//! let req = Request::get("http://127.0.0.1:8080/health").body(RetryBody::empty())?;
//! let resp = svc.oneshot(req).await?;
//! println!("{}", resp.status());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

/// Boxed error used at transport boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use crate::config::{ClientConfig, ConfigError};
pub use crate::http::{force_retry, RetryBody, RetryRequestExt};
pub use crate::lifecycle::{CallContext, Interrupt};
pub use crate::resilience::{execute, RetryError, RetryLayer, RetryPolicy, RetryService};
