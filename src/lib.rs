// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod config;
pub mod error;
pub mod runtime;
pub mod telemetry;
pub mod testkit;

pub use config::SeawallConfig;
pub use error::{ErrorDescriptor, Result, SeawallError};
pub use runtime::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, GuardContext,
    RateLimiter, RateLimiterConfig, RateLimiterRegistry, ServiceGuard,
};
pub use telemetry::{
    ConsoleSink, DispatcherConfig, EventDispatcher, Sink, TransactionEvent, TransactionType,
};
