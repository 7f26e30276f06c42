// SPDX-License-Identifier: MIT OR Apache-2.0

//! The protected-call entry point.
//!
//! `ServiceGuard` composes the rate limiter, the circuit breaker, an optional
//! per-call timeout, and the fallback provider around one unit of work, and
//! emits exactly one transaction event per invocation. Request-handling code
//! calls it directly around the business operation; there is no framework
//! weaving involved, which keeps the interception contract visible and
//! testable.
//!
//! # Example
//!
//! ```ignore
//! let response = guard
//!     .execute(
//!         || async { backend.fetch_products().await },
//!         |err| ProductList::degraded(ErrorDescriptor::from_error(err)),
//!     )
//!     .await;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{Result, SeawallError};
use crate::runtime::circuit_breaker::CircuitBreaker;
use crate::runtime::rate_limiter::RateLimiter;
use crate::telemetry::{
    EventDispatcher, TransactionEvent, TransactionEventBuilder, TransactionType,
};

/// How a protected call concluded, for logging purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    RateLimited,
    CircuitOpen,
    OperationFailed,
}

impl CallOutcome {
    #[must_use]
    pub fn from_error(err: &SeawallError) -> Self {
        match err {
            SeawallError::RateLimitExceeded { .. } => CallOutcome::RateLimited,
            SeawallError::CircuitOpen { .. } => CallOutcome::CircuitOpen,
            _ => CallOutcome::OperationFailed,
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Success => write!(f, "success"),
            CallOutcome::RateLimited => write!(f, "rate-limited"),
            CallOutcome::CircuitOpen => write!(f, "circuit-open"),
            CallOutcome::OperationFailed => write!(f, "operation-failed"),
        }
    }
}

/// Identity context stamped onto every event a guard emits.
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub api: String,
    pub environment: String,
    pub source_channel: String,
}

impl GuardContext {
    #[must_use]
    pub fn new(
        api: impl Into<String>,
        environment: impl Into<String>,
        source_channel: impl Into<String>,
    ) -> Self {
        Self {
            api: api.into(),
            environment: environment.into(),
            source_channel: source_channel.into(),
        }
    }
}

/// Executes protected calls for one API against one dependency.
///
/// A guard references exactly one rate limiter (by category) and one circuit
/// breaker (by dependency name), both usually obtained from their registries
/// so that concurrent guards share state. Every invocation produces one
/// finalized transaction event, and the caller always receives a value: all
/// rejections and failures are resolved through the fallback provider.
#[derive(Debug)]
pub struct ServiceGuard {
    context: GuardContext,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    dispatcher: Arc<EventDispatcher>,
    call_timeout: Option<Duration>,
}

impl ServiceGuard {
    /// Create a guard from its collaborators.
    #[must_use]
    pub fn new(
        context: GuardContext,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            context,
            limiter,
            breaker,
            dispatcher,
            call_timeout: None,
        }
    }

    /// Apply a deadline to every protected operation. An elapsed deadline is
    /// recorded as a failure outcome, not an escaping error.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Execute a protected call with a generated transaction id.
    ///
    /// See [`ServiceGuard::execute_with_transaction_id`].
    pub async fn execute<T, F, Fut, FB>(&self, operation: F, fallback: FB) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce(&SeawallError) -> T,
    {
        let transaction_id = generate_transaction_id();
        self.execute_with_transaction_id(transaction_id, operation, fallback)
            .await
    }

    /// Execute a protected call under the caller's transaction id.
    ///
    /// Sequence: rate limiter first (a rejection never touches the breaker),
    /// then the circuit breaker around the operation. The operation runs at
    /// most once, and not at all when either guard rejects. Whatever goes
    /// wrong, the fallback provider supplies the returned value, so callers
    /// get one consistent degraded-response contract.
    pub async fn execute_with_transaction_id<T, F, Fut, FB>(
        &self,
        transaction_id: impl Into<String>,
        operation: F,
        fallback: FB,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce(&SeawallError) -> T,
    {
        let transaction_id = transaction_id.into();
        let started_at = Utc::now();
        let builder = TransactionEvent::builder(
            &self.context.api,
            &self.context.environment,
            &self.context.source_channel,
            &transaction_id,
        )
        .requested_at(started_at)
        .process_start_at(started_at);

        debug!(
            target: "seawall::executor",
            transaction_id = %transaction_id,
            api = %self.context.api,
            "protected call started"
        );

        if let Err(err) = self.limiter.acquire() {
            return self.conclude_failure(builder, &transaction_id, err, fallback);
        }

        let result = match self.call_timeout {
            Some(timeout) => {
                self.breaker
                    .execute(|| async move {
                        match tokio::time::timeout(timeout, operation()).await {
                            Ok(result) => result,
                            Err(_) => Err(SeawallError::Timeout(timeout)),
                        }
                    })
                    .await
            }
            None => self.breaker.execute(operation).await,
        };

        match result {
            Ok(value) => {
                let event = builder.transaction_type(TransactionType::Response).build();
                debug!(
                    target: "seawall::executor",
                    transaction_id = %transaction_id,
                    outcome = %CallOutcome::Success,
                    timetaken_ms = event.response_time_millis().unwrap_or(0),
                    "protected call completed"
                );
                self.dispatcher.record(event);
                value
            }
            Err(err) => self.conclude_failure(builder, &transaction_id, err, fallback),
        }
    }

    fn conclude_failure<T, FB>(
        &self,
        builder: TransactionEventBuilder,
        transaction_id: &str,
        err: SeawallError,
        fallback: FB,
    ) -> T
    where
        FB: FnOnce(&SeawallError) -> T,
    {
        let outcome = CallOutcome::from_error(&err);
        let event = builder
            .transaction_type(TransactionType::Failure)
            .error_code(err.error_code())
            .add_error_message(format!("Failure: {err}"))
            .build();
        warn!(
            target: "seawall::executor",
            transaction_id = %transaction_id,
            api = %self.context.api,
            outcome = %outcome,
            timetaken_ms = event.response_time_millis().unwrap_or(0),
            "protected call degraded: {}", err
        );
        self.dispatcher.record(event);
        fallback(&err)
    }

    /// Identity context of this guard.
    #[must_use]
    pub fn context(&self) -> &GuardContext {
        &self.context
    }

    /// The circuit breaker guarding the dependency.
    #[must_use]
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The rate limiter admitting calls.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

fn generate_transaction_id() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    (0..16)
        .map(|_| {
            let idx = rand::random::<u32>() as usize % CHARSET.len();
            char::from(CHARSET[idx])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::runtime::rate_limiter::RateLimiterConfig;
    use crate::telemetry::DispatcherConfig;
    use crate::testkit::MemorySink;

    struct Setup {
        guard: ServiceGuard,
        sink: Arc<MemorySink>,
        dispatcher: Arc<EventDispatcher>,
    }

    fn setup(limiter_config: RateLimiterConfig, breaker_config: CircuitBreakerConfig) -> Setup {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = Arc::new(
            EventDispatcher::new(
                sink.clone(),
                DispatcherConfig::new().with_worker_count(1),
            )
            .unwrap(),
        );
        let guard = ServiceGuard::new(
            GuardContext::new("default-api", "localhost", "web"),
            Arc::new(RateLimiter::new("write", limiter_config)),
            Arc::new(CircuitBreaker::new("default-api", breaker_config)),
            Arc::clone(&dispatcher),
        );
        Setup {
            guard,
            sink,
            dispatcher,
        }
    }

    fn fast_breaker() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_sliding_window_size(10)
            .with_minimum_calls(2)
            .with_failure_rate_threshold(50.0)
            .with_wait_duration_open(Duration::from_millis(100))
            .with_permitted_calls_half_open(1)
    }

    fn flush(setup: &Setup) {
        setup.dispatcher.shutdown(Duration::from_secs(2)).unwrap();
    }

    #[tokio::test]
    async fn test_success_returns_value_and_records_response() {
        let s = setup(RateLimiterConfig::write_default(), fast_breaker());
        let value = s
            .guard
            .execute(
                || async { Ok::<_, SeawallError>("payload") },
                |_| "fallback",
            )
            .await;
        assert_eq!(value, "payload");

        flush(&s);
        let events = s.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transaction_type(), TransactionType::Response);
        assert!(events[0].response_time_millis().is_some());
        assert!(events[0].error_code().is_none());
        assert_eq!(events[0].api(), "default-api");
    }

    #[tokio::test]
    async fn test_rate_limited_call_uses_fallback_without_touching_breaker() {
        let s = setup(RateLimiterConfig::new(1, 1.0), fast_breaker());

        let first = s
            .guard
            .execute(|| async { Ok::<_, SeawallError>(1) }, |_| -1)
            .await;
        assert_eq!(first, 1);

        let second = s
            .guard
            .execute(
                || async { Ok::<_, SeawallError>(2) },
                |err| {
                    assert!(matches!(err, SeawallError::RateLimitExceeded { .. }));
                    -1
                },
            )
            .await;
        assert_eq!(second, -1);

        // The breaker saw only the admitted call.
        assert_eq!(s.guard.circuit_breaker().total_calls(), 1);

        flush(&s);
        let events = s.sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].transaction_type(), TransactionType::Failure);
        assert_eq!(events[1].error_code(), Some("ERR-429"));
    }

    #[tokio::test]
    async fn test_operation_failure_routes_to_fallback() {
        let s = setup(RateLimiterConfig::write_default(), fast_breaker());

        let value = s
            .guard
            .execute(
                || async { Err::<i32, _>(SeawallError::operation("backend down")) },
                |err| {
                    assert_eq!(err.error_code(), "ERR-000");
                    -1
                },
            )
            .await;
        assert_eq!(value, -1);
        assert_eq!(s.guard.circuit_breaker().failure_count(), 1);

        flush(&s);
        let events = s.sink.events();
        assert_eq!(events[0].transaction_type(), TransactionType::Failure);
        assert_eq!(events[0].error_code(), Some("ERR-000"));
        assert!(events[0]
            .error_message()
            .unwrap()
            .contains("backend down"));
    }

    #[tokio::test]
    async fn test_circuit_open_short_circuits_operation() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let s = setup(RateLimiterConfig::write_default(), fast_breaker());

        // Trip the breaker: two failures exceed 50% at the minimum sample.
        for _ in 0..2 {
            let _ = s
                .guard
                .execute(
                    || async { Err::<(), _>(SeawallError::operation("down")) },
                    |_| (),
                )
                .await;
        }
        assert_eq!(s.guard.circuit_breaker().state(), CircuitState::Open);

        let invoked = Arc::new(AtomicUsize::new(0));
        let inv = Arc::clone(&invoked);
        let value = s
            .guard
            .execute(
                move || async move {
                    inv.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, SeawallError>(1)
                },
                |err| {
                    assert!(matches!(err, SeawallError::CircuitOpen { .. }));
                    -1
                },
            )
            .await;

        assert_eq!(value, -1);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        flush(&s);
        let events = s.sink.events();
        assert_eq!(events[2].error_code(), Some("ERR-SHORTCIRCUIT"));
    }

    #[tokio::test]
    async fn test_timeout_recorded_as_breaker_failure() {
        let s = setup(RateLimiterConfig::write_default(), fast_breaker());
        let guard = s.guard.with_call_timeout(Duration::from_millis(50));

        let value = guard
            .execute(
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, SeawallError>(1)
                },
                |err| {
                    assert!(matches!(err, SeawallError::Timeout(_)));
                    -1
                },
            )
            .await;

        assert_eq!(value, -1);
        assert_eq!(guard.circuit_breaker().failure_count(), 1);

        s.dispatcher.shutdown(Duration::from_secs(2)).unwrap();
        let events = s.sink.events();
        assert_eq!(events[0].error_code(), Some("ERR-TIMEOUT"));
    }

    #[tokio::test]
    async fn test_caller_supplied_transaction_id() {
        let s = setup(RateLimiterConfig::write_default(), fast_breaker());
        let value = s
            .guard
            .execute_with_transaction_id(
                "txn-fixed-001",
                || async { Ok::<_, SeawallError>(()) },
                |_| (),
            )
            .await;
        assert_eq!(value, ());

        flush(&s);
        assert_eq!(s.sink.events()[0].transaction_id(), "txn-fixed-001");
    }

    #[tokio::test]
    async fn test_generated_transaction_ids_are_distinct() {
        let s = setup(RateLimiterConfig::write_default(), fast_breaker());
        for _ in 0..2 {
            let _ = s
                .guard
                .execute(|| async { Ok::<_, SeawallError>(()) }, |_| ())
                .await;
        }

        flush(&s);
        let events = s.sink.events();
        assert_eq!(events[0].transaction_id().len(), 16);
        assert_ne!(events[0].transaction_id(), events[1].transaction_id());
    }

    #[test]
    fn test_call_outcome_classification() {
        assert_eq!(
            CallOutcome::from_error(&SeawallError::RateLimitExceeded {
                category: "read".to_string(),
                retry_after: Duration::from_secs(1),
            }),
            CallOutcome::RateLimited
        );
        assert_eq!(
            CallOutcome::from_error(&SeawallError::CircuitOpen {
                name: "x".to_string(),
                retry_after: None,
            }),
            CallOutcome::CircuitOpen
        );
        assert_eq!(
            CallOutcome::from_error(&SeawallError::Timeout(Duration::from_secs(1))),
            CallOutcome::OperationFailed
        );
        assert_eq!(CallOutcome::Success.to_string(), "success");
    }
}
