// SPDX-License-Identifier: MIT OR Apache-2.0

//! Example: Guarded Service Calls
//!
//! This example demonstrates the full protection pipeline:
//! - Per-category rate limiting with read/write profiles
//! - Circuit breaker with fallback responses
//! - Asynchronous transaction telemetry on a console sink

use std::sync::Arc;
use std::time::Duration;

use seawall::{
    CircuitBreakerConfig, ConsoleSink, DispatcherConfig, ErrorDescriptor, EventDispatcher,
    GuardContext, RateLimiterConfig, SeawallConfig, SeawallError, ServiceGuard,
};

#[derive(Debug)]
#[allow(dead_code)]
struct ProductResponse {
    body: String,
    err: Option<ErrorDescriptor>,
}

impl ProductResponse {
    fn ok(body: &str) -> Self {
        Self {
            body: body.to_string(),
            err: None,
        }
    }

    fn degraded(err: &SeawallError) -> Self {
        Self {
            body: String::new(),
            err: Some(ErrorDescriptor::from_error(err)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // ==========================================================================
    // 1. Configuration and registries
    // ==========================================================================
    println!("=== Configuration ===");

    let config = SeawallConfig::default();
    let limiters = config.rate_limiter_registry();
    let breakers = config.circuit_breaker_registry();
    breakers.register(
        "default-api",
        CircuitBreakerConfig::new()
            .with_sliding_window_size(10)
            .with_minimum_calls(4)
            .with_failure_rate_threshold(50.0)
            .with_wait_duration_open(Duration::from_millis(500))
            .with_permitted_calls_half_open(2),
    );

    println!("Categories: {:?}", limiters.categories());
    println!("Breakers: {:?}", breakers.names());

    // ==========================================================================
    // 2. Telemetry dispatcher
    // ==========================================================================
    let dispatcher = Arc::new(EventDispatcher::new(
        Arc::new(ConsoleSink::new("guarded-service-demo")),
        DispatcherConfig::new().with_worker_count(2),
    )?);

    // ==========================================================================
    // 3. A guard around one dependency
    // ==========================================================================
    let guard = ServiceGuard::new(
        GuardContext::new("default-api", &config.environment, "demo-cli"),
        limiters.rate_limiter("write"),
        breakers.circuit_breaker("default-api"),
        Arc::clone(&dispatcher),
    )
    .with_call_timeout(Duration::from_millis(200));

    // ==========================================================================
    // 4. Successful call
    // ==========================================================================
    println!("\n=== Successful call ===");
    let response = guard
        .execute(
            || async { Ok::<_, SeawallError>(ProductResponse::ok("{\"products\": []}")) },
            |err| ProductResponse::degraded(err),
        )
        .await;
    println!("Response: {:?}", response);

    // ==========================================================================
    // 5. Failing dependency trips the breaker
    // ==========================================================================
    println!("\n=== Failing dependency ===");
    for i in 1..=4 {
        let response = guard
            .execute(
                || async { Err::<ProductResponse, _>(SeawallError::operation("backend down")) },
                |err| ProductResponse::degraded(err),
            )
            .await;
        println!(
            "Call {}: errorCode={:?}",
            i,
            response.err.as_ref().map(|e| e.error_code.as_str())
        );
    }
    println!(
        "Breaker state: {}, failures in window: {}",
        guard.circuit_breaker().state(),
        guard.circuit_breaker().failure_count()
    );

    // Short-circuited: the operation is not even invoked.
    let response = guard
        .execute(
            || async {
                println!("  (this operation never runs)");
                Ok::<_, SeawallError>(ProductResponse::ok("unreachable"))
            },
            |err| ProductResponse::degraded(err),
        )
        .await;
    println!(
        "While open: errorCode={:?}",
        response.err.as_ref().map(|e| e.error_code.as_str())
    );

    // ==========================================================================
    // 6. Recovery through half-open trials
    // ==========================================================================
    println!("\n=== Recovery ===");
    tokio::time::sleep(Duration::from_millis(600)).await;
    for _ in 0..2 {
        let _ = guard
            .execute(
                || async { Ok::<_, SeawallError>(ProductResponse::ok("{}")) },
                |err| ProductResponse::degraded(err),
            )
            .await;
    }
    println!("Breaker state: {}", guard.circuit_breaker().state());

    // ==========================================================================
    // 7. Rate limiting a burst
    // ==========================================================================
    println!("\n=== Burst against the write limiter ===");
    let burst_limiter = limiters.register("bulk-write", RateLimiterConfig::new(5, 5.0));
    let mut admitted = 0;
    let mut rejected = 0;
    for _ in 0..8 {
        if burst_limiter.try_acquire() {
            admitted += 1;
        } else {
            rejected += 1;
        }
    }
    println!("Admitted: {}, rejected: {}", admitted, rejected);

    // ==========================================================================
    // 8. Drain telemetry before exit
    // ==========================================================================
    println!("\n=== Shutdown ===");
    println!(
        "Events delivered: {}, dropped: {}",
        dispatcher.delivered(),
        dispatcher.dropped()
    );
    dispatcher.shutdown(Duration::from_secs(2))?;

    println!("\nExample complete");
    Ok(())
}
