//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! resilience/orchestrator.rs produces:
//!     → tracing events (retry decisions, exhaustion, replay failures)
//!     → metrics.rs (attempt/call counters, backoff histogram)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON), installed by the binary
//!     → whatever `metrics` recorder the embedding application installs
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (method, uri, attempt, delay)
//! - Metrics are cheap (atomic increments) and can be switched off per policy

pub mod logging;
pub mod metrics;
