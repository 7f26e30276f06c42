// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous dispatch of transaction events to a sink.
//!
//! `record` pushes onto a bounded queue and returns immediately; a fixed pool
//! of named worker threads drains the queue and performs the actual sink
//! delivery. The worker pool is deliberately made of OS threads so that a
//! sink which blocks can never stall the async request path.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use seawall::telemetry::{ConsoleSink, DispatcherConfig, EventDispatcher, TransactionEvent};
//!
//! let dispatcher = EventDispatcher::new(
//!     Arc::new(ConsoleSink::default()),
//!     DispatcherConfig::default(),
//! ).unwrap();
//!
//! let event = TransactionEvent::builder("default-api", "localhost", "web", "txn-1").build();
//! dispatcher.record(event);
//! dispatcher.shutdown(Duration::from_secs(1)).ok();
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{Result, SeawallError};
use crate::telemetry::event::TransactionEvent;
use crate::telemetry::sink::Sink;

/// Behavior when an event arrives and the queue is already full.
///
/// Both options are non-blocking; backpressure is never propagated to the
/// request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Drop the incoming event and count it.
    #[default]
    RejectNew,
    /// Evict the oldest queued event to make room, and count the eviction.
    DropOldest,
}

/// Configuration for the event dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum number of events held in the queue.
    pub queue_capacity: usize,
    /// Number of worker threads draining the queue.
    pub worker_count: usize,
    /// What to do when the queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Total delivery attempts per event (first try plus retries).
    pub delivery_attempts: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            worker_count: 2,
            overflow_policy: OverflowPolicy::RejectNew,
            thread_name_prefix: "telemetry-worker".to_string(),
            delivery_attempts: 2,
        }
    }
}

impl DispatcherConfig {
    /// Create a new dispatcher configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the worker thread count.
    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the overflow policy.
    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SeawallError::Config` when any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(SeawallError::Config(
                "dispatcher queue capacity must be positive".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(SeawallError::Config(
                "dispatcher worker count must be positive".to_string(),
            ));
        }
        if self.delivery_attempts == 0 {
            return Err(SeawallError::Config(
                "dispatcher delivery attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Error returned when shutdown could not drain the queue in time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("dispatcher shutdown timed out with {pending} events undelivered")]
    TimedOut { pending: usize },
}

struct Shared {
    config: DispatcherConfig,
    sink: Arc<dyn Sink>,
    queue: Mutex<VecDeque<TransactionEvent>>,
    available: Condvar,
    drained: Condvar,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    delivery_failures: AtomicU64,
}

impl Shared {
    fn deliver_with_retry(&self, event: &TransactionEvent) {
        for attempt in 1..=self.config.delivery_attempts {
            match self.sink.deliver(event) {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(err) => {
                    warn!(
                        target: "seawall::telemetry",
                        transaction_id = %event.transaction_id(),
                        attempt,
                        "sink delivery failed: {}", err
                    );
                }
            }
        }
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            target: "seawall::telemetry",
            transaction_id = %event.transaction_id(),
            "event dropped after {} delivery attempts", self.config.delivery_attempts
        );
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let event = {
            let mut queue = shared.queue.lock().expect("dispatcher queue lock poisoned");
            loop {
                if let Some(event) = queue.pop_front() {
                    shared.in_flight.fetch_add(1, Ordering::SeqCst);
                    break Some(event);
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .expect("dispatcher queue lock poisoned");
            }
        };

        let Some(event) = event else { break };
        shared.deliver_with_retry(&event);

        let queue = shared.queue.lock().expect("dispatcher queue lock poisoned");
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        if queue.is_empty() && shared.in_flight.load(Ordering::SeqCst) == 0 {
            shared.drained.notify_all();
        }
        drop(queue);
    }
    shared.drained.notify_all();
}

/// Bounded, non-blocking dispatcher feeding events to a [`Sink`].
pub struct EventDispatcher {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("config", &self.shared.config)
            .field("queue_len", &self.queue_len())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create a dispatcher and start its worker pool.
    ///
    /// # Errors
    ///
    /// Returns `SeawallError::Config` when the configuration is invalid.
    pub fn new(sink: Arc<dyn Sink>, config: DispatcherConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            config,
            sink,
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            drained: Condvar::new(),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(shared.config.worker_count);
        for i in 0..shared.config.worker_count {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", shared.config.thread_name_prefix, i))
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn telemetry worker thread");
            workers.push(handle);
        }

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Dispatcher with a default configuration.
    ///
    /// # Errors
    ///
    /// Never fails with the default configuration; the `Result` mirrors
    /// [`EventDispatcher::new`].
    pub fn with_defaults(sink: Arc<dyn Sink>) -> Result<Self> {
        Self::new(sink, DispatcherConfig::default())
    }

    /// Enqueue a finalized event for asynchronous delivery.
    ///
    /// Returns immediately in all cases: `true` when the event was accepted,
    /// `false` when it was dropped because the dispatcher is shut down or the
    /// queue was full under the `RejectNew` policy.
    pub fn record(&self, event: TransactionEvent) -> bool {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "seawall::telemetry",
                transaction_id = %event.transaction_id(),
                "event dropped: dispatcher is shut down"
            );
            return false;
        }

        let mut queue = self
            .shared
            .queue
            .lock()
            .expect("dispatcher queue lock poisoned");
        if queue.len() >= self.shared.config.queue_capacity {
            match self.shared.config.overflow_policy {
                OverflowPolicy::RejectNew => {
                    drop(queue);
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target: "seawall::telemetry",
                        transaction_id = %event.transaction_id(),
                        "telemetry queue full, rejecting event"
                    );
                    return false;
                }
                OverflowPolicy::DropOldest => {
                    queue.pop_front();
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        target: "seawall::telemetry",
                        "telemetry queue full, evicted oldest event"
                    );
                }
            }
        }
        queue.push_back(event);
        self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
        self.shared.available.notify_one();
        true
    }

    /// Stop intake and drain the queue, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownError::TimedOut` with the number of undelivered
    /// events when the sink could not keep up within the deadline. Worker
    /// threads stuck inside a blocking sink are left detached in that case.
    pub fn shutdown(&self, timeout: Duration) -> std::result::Result<(), ShutdownError> {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();

        let deadline = Instant::now() + timeout;
        let mut queue = self
            .shared
            .queue
            .lock()
            .expect("dispatcher queue lock poisoned");
        while !(queue.is_empty() && self.shared.in_flight.load(Ordering::SeqCst) == 0) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let pending = queue.len() + self.shared.in_flight.load(Ordering::SeqCst);
                return Err(ShutdownError::TimedOut { pending });
            }
            queue = self
                .shared
                .drained
                .wait_timeout(queue, remaining)
                .expect("dispatcher queue lock poisoned")
                .0;
        }
        drop(queue);

        // Queue empty and nothing in flight: the workers are exiting.
        let mut workers = self.workers.lock().expect("dispatcher worker lock poisoned");
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.shared
            .queue
            .lock()
            .expect("dispatcher queue lock poisoned")
            .len()
    }

    /// Total events accepted onto the queue.
    #[must_use]
    pub fn enqueued(&self) -> u64 {
        self.shared.enqueued.load(Ordering::Relaxed)
    }

    /// Total events successfully delivered to the sink.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Total events dropped by overflow or shutdown.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Total events abandoned after exhausting delivery attempts.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.shared.delivery_failures.load(Ordering::Relaxed)
    }

    /// Get the dispatcher configuration.
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        // Wake the workers so they can exit; undelivered events are lost,
        // which is acceptable for telemetry.
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
    }
}
