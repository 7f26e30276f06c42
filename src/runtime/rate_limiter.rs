// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-bucket rate limiting for request admission.
//!
//! Each category of call intent ("read", "write", ...) gets its own bucket.
//! Admission is O(1) and non-blocking: tokens refill lazily from elapsed
//! monotonic time, an admitted call consumes one token, and excess calls are
//! rejected immediately rather than queued.
//!
//! # Example
//!
//! ```
//! use seawall::runtime::{RateLimiter, RateLimiterConfig};
//!
//! let limiter = RateLimiter::new("write", RateLimiterConfig::write_default());
//! assert!(limiter.try_acquire());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Result, SeawallError};

/// Configuration for a single rate-limit category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum burst size; the bucket never holds more tokens than this.
    pub capacity: u32,
    /// Tokens added per second of elapsed time.
    pub refill_per_second: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::read_default()
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter configuration.
    #[must_use]
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    /// Profile for read-like operations (200 requests/second).
    #[must_use]
    pub fn read_default() -> Self {
        Self::new(200, 200.0)
    }

    /// Profile for write-like operations (20 requests/second).
    #[must_use]
    pub fn write_default() -> Self {
        Self::new(20, 20.0)
    }

    /// Set the burst capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the refill rate in tokens per second.
    #[must_use]
    pub fn with_refill_per_second(mut self, refill_per_second: f64) -> Self {
        self.refill_per_second = refill_per_second;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SeawallError::Config` if the capacity is zero or the refill
    /// rate is not a positive finite number.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SeawallError::Config(
                "rate limiter capacity must be positive".to_string(),
            ));
        }
        if !self.refill_per_second.is_finite() || self.refill_per_second <= 0.0 {
            return Err(SeawallError::Config(
                "rate limiter refill rate must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-category token bucket.
///
/// The bucket starts full. All mutation happens under one mutex, and the
/// monotonic clock is read inside that critical section so a refill can never
/// be computed against a stale token count.
#[derive(Debug)]
pub struct RateLimiter {
    category: String,
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter for one category with a full bucket.
    #[must_use]
    pub fn new(category: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            category: category.into(),
            config,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(config.capacity),
                last_refill: Instant::now(),
            }),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Attempt to admit one call.
    ///
    /// Refills the bucket from elapsed time, then consumes a token if at
    /// least one whole token is available. Never blocks and never borrows
    /// against future refill.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        self.refill(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            drop(bucket);
            self.admitted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            drop(bucket);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "seawall::limiter",
                category = %self.category,
                "rate limit exceeded"
            );
            false
        }
    }

    /// Attempt to admit one call, mapping rejection to the error taxonomy.
    ///
    /// # Errors
    ///
    /// Returns `SeawallError::RateLimitExceeded` with a retry hint when the
    /// bucket is empty.
    pub fn acquire(&self) -> Result<()> {
        if self.try_acquire() {
            Ok(())
        } else {
            Err(SeawallError::RateLimitExceeded {
                category: self.category.clone(),
                retry_after: self.time_until_available(),
            })
        }
    }

    /// Time until one whole token will be available, rounded up to whole
    /// seconds as a client retry hint (at least one second).
    #[must_use]
    pub fn time_until_available(&self) -> Duration {
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        self.refill(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let deficit = 1.0 - bucket.tokens;
        let secs = (deficit / self.config.refill_per_second).ceil().max(1.0);
        Duration::from_secs(secs as u64)
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let replenished = elapsed.as_secs_f64() * self.config.refill_per_second;
        bucket.tokens = (bucket.tokens + replenished).min(f64::from(self.config.capacity));
        bucket.last_refill = now;
    }

    /// Category this limiter guards.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Get the limiter configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Total calls admitted.
    #[must_use]
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Total calls rejected.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Process-wide registry of rate limiters keyed by category name.
///
/// Categories not configured up front are created lazily with the default
/// configuration, so every caller holding the registry shares one limiter
/// instance per category.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    default_config: RateLimiterConfig,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    /// Create a registry whose unconfigured categories use `default_config`.
    #[must_use]
    pub fn new(default_config: RateLimiterConfig) -> Self {
        Self {
            default_config,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the read profile as the default.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    /// Get or lazily create the limiter for `category`.
    pub fn rate_limiter(&self, category: &str) -> Arc<RateLimiter> {
        if let Some(limiter) = self
            .limiters
            .read()
            .expect("rate limiter registry lock poisoned")
            .get(category)
        {
            return Arc::clone(limiter);
        }

        let mut limiters = self
            .limiters
            .write()
            .expect("rate limiter registry lock poisoned");
        Arc::clone(
            limiters
                .entry(category.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(category, self.default_config))),
        )
    }

    /// Register a limiter for `category` with an explicit configuration,
    /// replacing any existing one.
    pub fn register(&self, category: &str, config: RateLimiterConfig) -> Arc<RateLimiter> {
        let limiter = Arc::new(RateLimiter::new(category, config));
        self.limiters
            .write()
            .expect("rate limiter registry lock poisoned")
            .insert(category.to_string(), Arc::clone(&limiter));
        limiter
    }

    /// Names of all categories currently registered.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        self.limiters
            .read()
            .expect("rate limiter registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}
