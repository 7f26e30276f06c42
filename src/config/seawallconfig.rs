// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seawall configuration file parser
//!
//! Settings are grouped the way operators think about them: rate-limit
//! categories, circuit-breaker dependencies, and the telemetry dispatcher.
//! All sections are optional; anything omitted falls back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use seawall::config::SeawallConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SeawallConfig::load_from_path("seawall.yaml")?;
//! let registry = config.rate_limiter_registry();
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeawallError};
use crate::runtime::{
    CircuitBreakerConfig, CircuitBreakerRegistry, RateLimiterConfig, RateLimiterRegistry,
};
use crate::telemetry::{DispatcherConfig, OverflowPolicy};

/// Rate-limit settings for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub refill_per_second: f64,
}

impl From<RateLimitSettings> for RateLimiterConfig {
    fn from(settings: RateLimitSettings) -> Self {
        RateLimiterConfig::new(settings.capacity, settings.refill_per_second)
    }
}

/// Circuit-breaker settings for one dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub sliding_window_size: usize,
    pub minimum_calls: usize,
    pub failure_rate_threshold: f32,
    pub wait_duration_open_ms: u64,
    pub permitted_calls_half_open: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let config = CircuitBreakerConfig::default();
        Self {
            sliding_window_size: config.sliding_window_size,
            minimum_calls: config.minimum_calls,
            failure_rate_threshold: config.failure_rate_threshold,
            wait_duration_open_ms: config.wait_duration_open.as_millis() as u64,
            permitted_calls_half_open: config.permitted_calls_half_open,
        }
    }
}

impl From<BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: BreakerSettings) -> Self {
        CircuitBreakerConfig::new()
            .with_sliding_window_size(settings.sliding_window_size)
            .with_minimum_calls(settings.minimum_calls)
            .with_failure_rate_threshold(settings.failure_rate_threshold)
            .with_wait_duration_open(Duration::from_millis(settings.wait_duration_open_ms))
            .with_permitted_calls_half_open(settings.permitted_calls_half_open)
    }
}

/// Telemetry dispatcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub overflow_policy: OverflowPolicy,
    pub thread_name_prefix: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        let config = DispatcherConfig::default();
        Self {
            queue_capacity: config.queue_capacity,
            worker_count: config.worker_count,
            overflow_policy: config.overflow_policy,
            thread_name_prefix: config.thread_name_prefix,
        }
    }
}

impl From<DispatcherSettings> for DispatcherConfig {
    fn from(settings: DispatcherSettings) -> Self {
        DispatcherConfig::new()
            .with_queue_capacity(settings.queue_capacity)
            .with_worker_count(settings.worker_count)
            .with_overflow_policy(settings.overflow_policy)
            .with_thread_name_prefix(settings.thread_name_prefix)
    }
}

/// Represents the entire seawall configuration file structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeawallConfig {
    /// Deployment environment stamped onto transaction events
    /// (localhost, unit, stage, prod).
    pub environment: String,

    /// Map of category names to their rate-limit settings.
    pub rate_limiters: HashMap<String, RateLimitSettings>,

    /// Map of dependency names to their circuit-breaker settings.
    pub circuit_breakers: HashMap<String, BreakerSettings>,

    /// Telemetry dispatcher sizing.
    pub dispatcher: DispatcherSettings,
}

impl Default for SeawallConfig {
    fn default() -> Self {
        let mut rate_limiters = HashMap::new();
        rate_limiters.insert(
            "read".to_string(),
            RateLimitSettings {
                capacity: 200,
                refill_per_second: 200.0,
            },
        );
        rate_limiters.insert(
            "write".to_string(),
            RateLimitSettings {
                capacity: 20,
                refill_per_second: 20.0,
            },
        );

        Self {
            environment: "localhost".to_string(),
            rate_limiters,
            circuit_breakers: HashMap::new(),
            dispatcher: DispatcherSettings::default(),
        }
    }
}

impl SeawallConfig {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file is malformed YAML
    /// - Any setting fails validation
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SeawallError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or a setting is invalid.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| SeawallError::Config(format!("Failed to parse config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first `SeawallError::Config` encountered.
    pub fn validate(&self) -> Result<()> {
        for (category, settings) in &self.rate_limiters {
            RateLimiterConfig::from(*settings).validate().map_err(|e| {
                SeawallError::Config(format!("rate limiter '{}': {}", category, e))
            })?;
        }
        for (name, settings) in &self.circuit_breakers {
            CircuitBreakerConfig::from(settings.clone())
                .validate()
                .map_err(|e| SeawallError::Config(format!("circuit breaker '{}': {}", name, e)))?;
        }
        DispatcherConfig::from(self.dispatcher.clone())
            .validate()
            .map_err(|e| SeawallError::Config(format!("dispatcher: {}", e)))?;
        Ok(())
    }

    /// Build a rate limiter registry with every configured category
    /// registered up front.
    #[must_use]
    pub fn rate_limiter_registry(&self) -> RateLimiterRegistry {
        let registry = RateLimiterRegistry::with_defaults();
        for (category, settings) in &self.rate_limiters {
            registry.register(category, (*settings).into());
        }
        registry
    }

    /// Build a circuit breaker registry with every configured dependency
    /// registered up front.
    #[must_use]
    pub fn circuit_breaker_registry(&self) -> CircuitBreakerRegistry {
        let registry = CircuitBreakerRegistry::with_defaults();
        for (name, settings) in &self.circuit_breakers {
            registry.register(name, settings.clone().into());
        }
        registry
    }

    /// Dispatcher configuration derived from this file.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        self.dispatcher.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
environment: stage
rate_limiters:
  read:
    capacity: 200
    refill_per_second: 200.0
  write:
    capacity: 20
    refill_per_second: 20.0
circuit_breakers:
  default-api:
    sliding_window_size: 100
    minimum_calls: 10
    failure_rate_threshold: 50.0
    wait_duration_open_ms: 5000
    permitted_calls_half_open: 10
  legacy-backend:
    minimum_calls: 5
dispatcher:
  queue_capacity: 512
  worker_count: 4
  overflow_policy: drop-oldest
  thread_name_prefix: sample-telemetry
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = SeawallConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.environment, "stage");
        assert_eq!(config.rate_limiters.len(), 2);
        assert_eq!(config.rate_limiters["write"].capacity, 20);
        assert_eq!(config.circuit_breakers.len(), 2);
        assert_eq!(
            config.circuit_breakers["default-api"].wait_duration_open_ms,
            5000
        );
        assert_eq!(config.dispatcher.worker_count, 4);
        assert_eq!(config.dispatcher.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_partial_breaker_settings_fall_back_to_defaults() {
        let config = SeawallConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        let legacy = &config.circuit_breakers["legacy-backend"];
        assert_eq!(legacy.minimum_calls, 5);
        assert_eq!(legacy.sliding_window_size, 100);
        assert_eq!(legacy.failure_rate_threshold, 50.0);
    }

    #[test]
    fn test_default_config() {
        let config = SeawallConfig::default();
        assert_eq!(config.environment, "localhost");
        assert_eq!(config.rate_limiters["read"].capacity, 200);
        assert_eq!(config.rate_limiters["write"].capacity, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = SeawallConfig::from_yaml("{}").unwrap();
        assert_eq!(config, SeawallConfig::default());
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let result = SeawallConfig::from_yaml("rate_limiters: [not, a, map]");
        assert!(matches!(result, Err(SeawallError::Config(_))));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let yaml = r#"
rate_limiters:
  read:
    capacity: 0
    refill_per_second: 10.0
"#;
        let err = SeawallConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("rate limiter 'read'"));
    }

    #[test]
    fn test_registries_from_config() {
        let config = SeawallConfig::from_yaml(SAMPLE_CONFIG).unwrap();

        let limiters = config.rate_limiter_registry();
        assert_eq!(limiters.rate_limiter("write").config().capacity, 20);

        let breakers = config.circuit_breaker_registry();
        let legacy = breakers.circuit_breaker("legacy-backend");
        assert_eq!(legacy.config().minimum_calls, 5);

        let dispatcher = config.dispatcher_config();
        assert_eq!(dispatcher.queue_capacity, 512);
        assert_eq!(dispatcher.thread_name_prefix, "sample-telemetry");
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

        let config = SeawallConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.environment, "stage");
    }

    #[test]
    fn test_missing_file_error_mentions_path() {
        let err = SeawallConfig::load_from_path("/nonexistent/seawall.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/seawall.yaml"));
    }

    #[test]
    fn test_round_trip_serialization() {
        let config = SeawallConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let reparsed = SeawallConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config, reparsed);
    }
}
