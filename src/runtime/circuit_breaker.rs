// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker for protecting calls to failing dependencies.
//!
//! Tracks the most recent call outcomes in a count-based sliding window and
//! short-circuits calls once the failure rate climbs too high, giving the
//! dependency time to recover before trial traffic is let through again.
//!
//! # States
//!
//! - **Closed**: calls pass through and their outcomes are recorded
//! - **Open**: calls are rejected immediately, nothing is recorded
//! - **Half-Open**: a bounded number of trial calls probe for recovery
//!
//! # Example
//!
//! ```ignore
//! use seawall::runtime::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("default-api", CircuitBreakerConfig::default());
//!
//! let result = breaker.execute(|| async {
//!     backend.fetch().await
//! }).await;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{Result, SeawallError};
use crate::runtime::window::{Outcome, OutcomeWindow};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through normally and outcomes are recorded.
    Closed,
    /// Calls fail immediately without reaching the dependency.
    Open,
    /// Trial calls are probing whether the dependency has recovered.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Observer notified of every state transition.
///
/// Implementations are telemetry-only: they run after the transition has been
/// committed and the breaker's lock released, and a panicking observer is
/// contained rather than allowed to disturb the caller.
pub trait StateObserver: Send + Sync {
    fn on_transition(&self, name: &str, from: CircuitState, to: CircuitState);
}

/// Default observer that logs transitions through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl StateObserver for LoggingObserver {
    fn on_transition(&self, name: &str, _from: CircuitState, to: CircuitState) {
        info!(
            target: "seawall::breaker",
            breaker = %name,
            "Circuit breaker transitioned to {} state", to
        );
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of recent outcomes retained for the failure-rate calculation.
    pub sliding_window_size: usize,
    /// Minimum recorded outcomes before the failure rate is evaluated.
    pub minimum_calls: usize,
    /// Failure percentage that must be exceeded to open the circuit.
    ///
    /// The comparison is strict: a window sitting exactly at the threshold
    /// keeps the circuit closed.
    pub failure_rate_threshold: f32,
    /// Duration to wait in the open state before admitting trial calls.
    pub wait_duration_open: Duration,
    /// Number of trial calls permitted in the half-open state.
    pub permitted_calls_half_open: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 100,
            minimum_calls: 10,
            failure_rate_threshold: 50.0,
            wait_duration_open: Duration::from_secs(30),
            permitted_calls_half_open: 10,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sliding window size.
    #[must_use]
    pub fn with_sliding_window_size(mut self, size: usize) -> Self {
        self.sliding_window_size = size;
        self
    }

    /// Set the minimum number of calls before the rate is evaluated.
    #[must_use]
    pub fn with_minimum_calls(mut self, minimum_calls: usize) -> Self {
        self.minimum_calls = minimum_calls;
        self
    }

    /// Set the failure-rate threshold percentage.
    #[must_use]
    pub fn with_failure_rate_threshold(mut self, threshold: f32) -> Self {
        self.failure_rate_threshold = threshold;
        self
    }

    /// Set the wait duration in the open state.
    #[must_use]
    pub fn with_wait_duration_open(mut self, wait: Duration) -> Self {
        self.wait_duration_open = wait;
        self
    }

    /// Set the number of permitted half-open trial calls.
    #[must_use]
    pub fn with_permitted_calls_half_open(mut self, permitted: usize) -> Self {
        self.permitted_calls_half_open = permitted;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SeawallError::Config` when any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.sliding_window_size == 0 {
            return Err(SeawallError::Config(
                "sliding window size must be positive".to_string(),
            ));
        }
        if self.minimum_calls == 0 || self.minimum_calls > self.sliding_window_size {
            return Err(SeawallError::Config(
                "minimum calls must be positive and fit the sliding window".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.failure_rate_threshold)
            || self.failure_rate_threshold == 0.0
        {
            return Err(SeawallError::Config(
                "failure rate threshold must be within (0, 100]".to_string(),
            ));
        }
        if self.permitted_calls_half_open == 0 {
            return Err(SeawallError::Config(
                "permitted half-open calls must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: OutcomeWindow,
    opened_at: Option<Instant>,
    half_open_permits_remaining: usize,
    half_open_completed: usize,
    /// Bumped on every state transition; outcomes from calls admitted under
    /// an older generation are discarded on completion.
    generation: u64,
}

/// A claim on the breaker handed out at admission time and redeemed when the
/// call completes.
#[derive(Debug, Clone, Copy)]
struct Permit {
    generation: u64,
    trial: bool,
}

type Transition = (CircuitState, CircuitState);

/// Per-dependency circuit breaker.
///
/// All transition-relevant state lives under a single mutex so that a state
/// read which triggers a transition commits the mutation in the same critical
/// section. The held sections are bounded: the protected operation itself is
/// always awaited with the lock released.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    observer: Arc<dyn StateObserver>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration and the
    /// default logging observer.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_observer(name, config, Arc::new(LoggingObserver))
    }

    /// Create a circuit breaker with a custom transition observer.
    #[must_use]
    pub fn with_observer(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        observer: Arc<dyn StateObserver>,
    ) -> Self {
        let window = OutcomeWindow::new(config.sliding_window_size);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                half_open_permits_remaining: 0,
                half_open_completed: 0,
                generation: 0,
            }),
            observer,
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    /// Execute an async operation under circuit breaker protection.
    ///
    /// The operation is invoked at most once, and not at all when the call is
    /// short-circuited. Any error from the operation records a failure
    /// outcome; success records a success outcome.
    ///
    /// # Errors
    ///
    /// Returns `SeawallError::CircuitOpen` when the circuit rejects the call,
    /// or the operation's own error after its outcome has been recorded.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let permit = match self.try_acquire() {
            Ok(permit) => permit,
            Err(err) => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };

        match operation().await {
            Ok(value) => {
                self.record_outcome(permit, Outcome::Success);
                Ok(value)
            }
            Err(err) => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                self.record_outcome(permit, Outcome::Failure);
                Err(err)
            }
        }
    }

    /// Claim admission for one call.
    ///
    /// Performs the lazy OPEN to HALF_OPEN transition when the wait duration
    /// has elapsed; the permit handout happens in the same critical section,
    /// so concurrent callers can never admit more trials than permitted.
    fn try_acquire(&self) -> Result<Permit> {
        let (result, transition) = {
            let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
            match inner.state {
                CircuitState::Closed => (
                    Ok(Permit {
                        generation: inner.generation,
                        trial: false,
                    }),
                    None,
                ),
                CircuitState::Open => {
                    let elapsed = inner
                        .opened_at
                        .map(|at| at.elapsed())
                        .unwrap_or(Duration::ZERO);
                    if elapsed >= self.config.wait_duration_open {
                        let transition = self.enter_half_open(&mut inner);
                        inner.half_open_permits_remaining -= 1;
                        (
                            Ok(Permit {
                                generation: inner.generation,
                                trial: true,
                            }),
                            Some(transition),
                        )
                    } else {
                        let remaining = self.config.wait_duration_open - elapsed;
                        (
                            Err(SeawallError::CircuitOpen {
                                name: self.name.clone(),
                                retry_after: Some(remaining),
                            }),
                            None,
                        )
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_permits_remaining > 0 {
                        inner.half_open_permits_remaining -= 1;
                        (
                            Ok(Permit {
                                generation: inner.generation,
                                trial: true,
                            }),
                            None,
                        )
                    } else {
                        // Out of trial permits: treated the same as open.
                        (
                            Err(SeawallError::CircuitOpen {
                                name: self.name.clone(),
                                retry_after: None,
                            }),
                            None,
                        )
                    }
                }
            }
        };

        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
        result
    }

    /// Redeem a permit with the call's outcome and drive state transitions.
    fn record_outcome(&self, permit: Permit, outcome: Outcome) {
        let transition = {
            let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
            if permit.generation != inner.generation {
                // The breaker transitioned while this call was in flight;
                // its outcome no longer belongs to any window.
                None
            } else if permit.trial {
                self.record_trial(&mut inner, outcome)
            } else {
                self.record_regular(&mut inner, outcome)
            }
        };

        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
    }

    fn record_regular(&self, inner: &mut Inner, outcome: Outcome) -> Option<Transition> {
        inner.window.record(outcome);
        let sampled = inner.window.len() >= self.config.minimum_calls;
        if sampled && inner.window.failure_rate() > self.config.failure_rate_threshold {
            return Some(self.open(inner, CircuitState::Closed));
        }
        None
    }

    fn record_trial(&self, inner: &mut Inner, outcome: Outcome) -> Option<Transition> {
        inner.window.record(outcome);
        match outcome {
            // Fail fast during probation: the first trial failure re-opens.
            Outcome::Failure => Some(self.open(inner, CircuitState::HalfOpen)),
            Outcome::Success => {
                inner.half_open_completed += 1;
                if inner.half_open_completed >= self.config.permitted_calls_half_open {
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.opened_at = None;
                    inner.generation += 1;
                    Some((CircuitState::HalfOpen, CircuitState::Closed))
                } else {
                    None
                }
            }
        }
    }

    fn open(&self, inner: &mut Inner, from: CircuitState) -> Transition {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.generation += 1;
        (from, CircuitState::Open)
    }

    fn enter_half_open(&self, inner: &mut Inner) -> Transition {
        inner.state = CircuitState::HalfOpen;
        inner.window.clear();
        inner.half_open_permits_remaining = self.config.permitted_calls_half_open;
        inner.half_open_completed = 0;
        inner.generation += 1;
        (CircuitState::Open, CircuitState::HalfOpen)
    }

    fn notify(&self, from: CircuitState, to: CircuitState) {
        let name = self.name.as_str();
        let observer = Arc::clone(&self.observer);
        let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_transition(name, from, to)));
        if outcome.is_err() {
            warn!(
                target: "seawall::breaker",
                breaker = %self.name,
                "state observer panicked during {} -> {} notification", from, to
            );
        }
    }

    /// Name of the guarded dependency.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current circuit state.
    ///
    /// This is a plain read; the OPEN to HALF_OPEN transition happens lazily
    /// on the next admission attempt, not here.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner
            .lock()
            .expect("circuit breaker lock poisoned")
            .state
    }

    /// Number of outcomes currently recorded in the sliding window.
    #[must_use]
    pub fn recorded_calls(&self) -> usize {
        self.inner
            .lock()
            .expect("circuit breaker lock poisoned")
            .window
            .len()
    }

    /// Number of failures currently recorded in the sliding window.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.inner
            .lock()
            .expect("circuit breaker lock poisoned")
            .window
            .failure_count()
    }

    /// Time remaining until trial calls will be admitted, if open.
    #[must_use]
    pub fn time_until_retry(&self) -> Option<Duration> {
        let inner = self.inner.lock().expect("circuit breaker lock poisoned");
        if inner.state != CircuitState::Open {
            return None;
        }
        inner.opened_at.map(|opened| {
            self.config
                .wait_duration_open
                .saturating_sub(opened.elapsed())
        })
    }

    /// Manually reset the circuit to closed with an empty window.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
            let from = inner.state;
            inner.state = CircuitState::Closed;
            inner.window.clear();
            inner.opened_at = None;
            inner.half_open_permits_remaining = 0;
            inner.half_open_completed = 0;
            inner.generation += 1;
            (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
        };
        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
    }

    /// Total number of calls attempted through this breaker.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Total number of operation failures.
    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Total number of short-circuited calls.
    #[must_use]
    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }

    /// Get the circuit breaker configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// Process-wide registry of circuit breakers keyed by dependency name.
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    observer: Arc<dyn StateObserver>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerRegistry {
    /// Create a registry whose lazily-created breakers use `default_config`.
    #[must_use]
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            observer: Arc::new(LoggingObserver),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the default breaker configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Set the observer attached to breakers created by this registry.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Get or lazily create the breaker for `name`.
    pub fn circuit_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self
            .breakers
            .read()
            .expect("circuit breaker registry lock poisoned")
            .get(name)
        {
            return Arc::clone(breaker);
        }

        let mut breakers = self
            .breakers
            .write()
            .expect("circuit breaker registry lock poisoned");
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::with_observer(
                name,
                self.default_config.clone(),
                Arc::clone(&self.observer),
            ))
        }))
    }

    /// Register a breaker for `name` with an explicit configuration,
    /// replacing any existing one.
    pub fn register(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::with_observer(
            name,
            config,
            Arc::clone(&self.observer),
        ));
        self.breakers
            .write()
            .expect("circuit breaker registry lock poisoned")
            .insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Names of all breakers currently registered.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.breakers
            .read()
            .expect("circuit breaker registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}
