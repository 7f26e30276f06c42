// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime guards for protected calls.
//!
//! This module provides the admission and failure-isolation machinery wrapped
//! around every protected call: the token-bucket rate limiter, the circuit
//! breaker with its sliding outcome window, and the `ServiceGuard` executor
//! that composes them with a fallback.

mod circuit_breaker;
mod executor;
mod rate_limiter;
mod window;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, LoggingObserver,
    StateObserver,
};
pub use executor::{CallOutcome, GuardContext, ServiceGuard};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterRegistry};
pub use window::Outcome;
