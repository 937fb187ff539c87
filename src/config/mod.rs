//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → RetryPolicy::from_config (built once per client)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a policy never changes after construction
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackoffConfig, BackoffStrategy, ClientConfig, LogFormat, ObservabilityConfig, RetryConfig,
    TimeoutConfig,
};
pub use validation::ValidationError;
