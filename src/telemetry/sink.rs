// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery seam for finished transaction events.
//!
//! The dispatcher hands finalized events to a [`Sink`]; what happens next
//! (console, message queue, HTTP collector) is the sink implementation's
//! concern. The crate ships [`ConsoleSink`], which wraps each event in a log
//! record envelope and emits one JSON line through `tracing`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::telemetry::event::TransactionEvent;

/// Error raised by a sink while delivering an event.
///
/// Delivery failures are telemetry-only: the dispatcher logs and drops them,
/// and nothing ever propagates back to the request path.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event delivery failed: {0}")]
    Delivery(String),
}

/// Consumer of finished transaction events.
///
/// `deliver` runs on a dispatcher worker thread, never on the request path,
/// and is best-effort: a returned error triggers at most one retry.
pub trait Sink: Send + Sync {
    fn deliver(&self, event: &TransactionEvent) -> Result<(), SinkError>;
}

/// Envelope wrapped around each event on the console sink's wire format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord<'a> {
    report_type: &'a str,
    component: &'a str,
    environment: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<&'a str>,
    timestamp: DateTime<Utc>,
    data: &'a TransactionEvent,
}

/// Sink that writes each event as a single structured JSON line.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    component: String,
    hostname: Option<String>,
}

impl ConsoleSink {
    /// Create a console sink reporting under the given component name.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            hostname: std::env::var("HOSTNAME").ok(),
        }
    }

    /// Override the reported hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new("seawall")
    }
}

impl Sink for ConsoleSink {
    fn deliver(&self, event: &TransactionEvent) -> Result<(), SinkError> {
        let record = LogRecord {
            report_type: "transaction",
            component: &self.component,
            environment: event.environment(),
            hostname: self.hostname.as_deref(),
            timestamp: Utc::now(),
            data: event,
        };
        let line = serde_json::to_string(&record)?;
        if !line.is_empty() {
            info!(target: "seawall::telemetry", "{}", line);
        }
        Ok(())
    }
}
