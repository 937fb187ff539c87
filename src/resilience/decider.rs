//! Retry eligibility by request class.
//!
//! # Design Decisions
//! - Looks at the request head only; the body is never touched
//! - Default is conservative: only safe, idempotent methods are retried
//! - The force-retry marker is checked by the policy before any decider runs

use std::collections::HashSet;

use http::request::Parts;
use http::Method;

/// Decides whether a request may be retried at all.
pub trait RetryDecider: Send + Sync {
    fn decide(&self, parts: &Parts) -> bool;
}

impl<F> RetryDecider for F
where
    F: Fn(&Parts) -> bool + Send + Sync,
{
    fn decide(&self, parts: &Parts) -> bool {
        self(parts)
    }
}

/// Retries requests whose method is in a fixed set.
#[derive(Debug, Clone)]
pub struct IdempotentMethods {
    methods: HashSet<Method>,
}

impl IdempotentMethods {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

impl Default for IdempotentMethods {
    /// GET, HEAD and OPTIONS.
    fn default() -> Self {
        Self::new([Method::GET, Method::HEAD, Method::OPTIONS])
    }
}

impl RetryDecider for IdempotentMethods {
    fn decide(&self, parts: &Parts) -> bool {
        self.contains(&parts.method)
    }
}
