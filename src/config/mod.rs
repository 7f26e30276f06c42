// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration management for the protection layer
//!
//! This module provides the settings surface consumed at startup: per-category
//! rate limits, per-dependency circuit breaker thresholds, and dispatcher
//! sizing, loadable from a YAML file.

mod seawallconfig;

pub use seawallconfig::{
    BreakerSettings, DispatcherSettings, RateLimitSettings, SeawallConfig,
};
