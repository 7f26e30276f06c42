// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for exercising the telemetry pipeline.
//!
//! These sinks stand in for real delivery targets in unit and integration
//! tests: [`MemorySink`] records everything, [`FailingSink`] fails a set
//! number of times, and [`BlockingSink`] holds deliveries until released to
//! simulate an arbitrarily slow target.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::telemetry::{Sink, SinkError, TransactionEvent};

/// Sink that stores every delivered event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TransactionEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the delivered events in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<TransactionEvent> {
        self.events.lock().expect("memory sink lock poisoned").clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().expect("memory sink lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink for MemorySink {
    fn deliver(&self, event: &TransactionEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .expect("memory sink lock poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Sink that fails the first `failures` deliveries, then succeeds.
#[derive(Debug)]
pub struct FailingSink {
    failures: usize,
    attempts: AtomicUsize,
    delivered: AtomicUsize,
}

impl FailingSink {
    /// Sink that fails the first `failures` delivery attempts.
    #[must_use]
    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
            delivered: AtomicUsize::new(0),
        }
    }

    /// Total delivery attempts observed.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Deliveries that succeeded.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

impl Sink for FailingSink {
    fn deliver(&self, _event: &TransactionEvent) -> Result<(), SinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(SinkError::Delivery(format!(
                "injected failure on attempt {}",
                attempt + 1
            )));
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink that blocks inside `deliver` until released.
///
/// Deliveries started before the release park on a condvar, which pins the
/// dispatcher worker the way an unresponsive delivery target would.
#[derive(Debug, Default)]
pub struct BlockingSink {
    released: Mutex<bool>,
    gate: Condvar,
    started: AtomicUsize,
    events: Mutex<Vec<TransactionEvent>>,
}

impl BlockingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries that have entered the sink.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Snapshot of the events delivered after release.
    #[must_use]
    pub fn events(&self) -> Vec<TransactionEvent> {
        self.events
            .lock()
            .expect("blocking sink lock poisoned")
            .clone()
    }

    /// Open the gate; blocked and future deliveries complete immediately.
    pub fn release_all(&self) {
        let mut released = self.released.lock().expect("blocking sink lock poisoned");
        *released = true;
        self.gate.notify_all();
    }
}

impl Sink for BlockingSink {
    fn deliver(&self, event: &TransactionEvent) -> Result<(), SinkError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut released = self.released.lock().expect("blocking sink lock poisoned");
        while !*released {
            released = self
                .gate
                .wait(released)
                .expect("blocking sink lock poisoned");
        }
        drop(released);

        self.events
            .lock()
            .expect("blocking sink lock poisoned")
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TransactionType;

    fn event(id: &str) -> TransactionEvent {
        TransactionEvent::builder("default-api", "localhost", "web", id)
            .transaction_type(TransactionType::Response)
            .build()
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.deliver(&event("a")).unwrap();
        sink.deliver(&event("b")).unwrap();

        assert_eq!(sink.len(), 2);
        let events = sink.events();
        assert_eq!(events[0].transaction_id(), "a");
        assert_eq!(events[1].transaction_id(), "b");
    }

    #[test]
    fn test_failing_sink_fails_then_succeeds() {
        let sink = FailingSink::failing(2);
        assert!(sink.deliver(&event("a")).is_err());
        assert!(sink.deliver(&event("a")).is_err());
        assert!(sink.deliver(&event("a")).is_ok());
        assert_eq!(sink.attempts(), 3);
        assert_eq!(sink.delivered(), 1);
    }

    #[test]
    fn test_blocking_sink_releases() {
        use std::sync::Arc;
        let sink = Arc::new(BlockingSink::new());

        let worker = {
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || sink.deliver(&event("a")))
        };

        // Wait until the delivery has parked on the gate, then release it.
        while sink.started() == 0 {
            std::thread::yield_now();
        }
        sink.release_all();
        worker.join().unwrap().unwrap();
        assert_eq!(sink.events().len(), 1);
    }
}
