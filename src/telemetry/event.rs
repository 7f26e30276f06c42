// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction events describing one protected-call lifecycle.
//!
//! An event is accumulated through the builder while the call runs and
//! finalized exactly once into an immutable record, which is then handed to
//! the dispatcher for asynchronous delivery.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle stage of a transaction event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionType {
    Request,
    InProcess,
    Response,
    Failure,
}

impl TransactionType {
    /// Whether this stage carries a response time.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionType::Response | TransactionType::Failure)
    }
}

/// Immutable record of one request lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    transaction_id: String,
    api: String,
    source_channel: String,
    environment: String,
    transaction_type: TransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    error_messages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warning_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requested_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    process_start_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    process_end_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_time_millis: Option<u64>,
}

impl TransactionEvent {
    /// Start building an event for one protected call.
    #[must_use]
    pub fn builder(
        api: impl Into<String>,
        environment: impl Into<String>,
        source_channel: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> TransactionEventBuilder {
        TransactionEventBuilder {
            transaction_id: transaction_id.into(),
            api: api.into(),
            source_channel: source_channel.into(),
            environment: environment.into(),
            transaction_type: TransactionType::Request,
            error_code: None,
            error_messages: Vec::new(),
            warning_codes: Vec::new(),
            requested_at: None,
            process_start_at: None,
            process_end_at: None,
        }
    }

    #[must_use]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    #[must_use]
    pub fn source_channel(&self) -> &str {
        &self.source_channel
    }

    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    #[must_use]
    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    /// Error messages in the order they were appended.
    #[must_use]
    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    /// All error messages joined with single spaces, `None` when there are
    /// none.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        if self.error_messages.is_empty() {
            None
        } else {
            Some(self.error_messages.join(" "))
        }
    }

    #[must_use]
    pub fn warning_codes(&self) -> &[String] {
        &self.warning_codes
    }

    #[must_use]
    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    #[must_use]
    pub fn process_start_at(&self) -> Option<DateTime<Utc>> {
        self.process_start_at
    }

    #[must_use]
    pub fn process_end_at(&self) -> Option<DateTime<Utc>> {
        self.process_end_at
    }

    /// Elapsed processing time in milliseconds; present only on finalized
    /// `Response` and `Failure` events.
    #[must_use]
    pub fn response_time_millis(&self) -> Option<u64> {
        self.response_time_millis
    }
}

/// Append-only builder for [`TransactionEvent`].
#[derive(Debug, Clone)]
pub struct TransactionEventBuilder {
    transaction_id: String,
    api: String,
    source_channel: String,
    environment: String,
    transaction_type: TransactionType,
    error_code: Option<String>,
    error_messages: Vec<String>,
    warning_codes: Vec<String>,
    requested_at: Option<DateTime<Utc>>,
    process_start_at: Option<DateTime<Utc>>,
    process_end_at: Option<DateTime<Utc>>,
}

impl TransactionEventBuilder {
    /// Set the lifecycle stage.
    #[must_use]
    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    /// Set the error code.
    #[must_use]
    pub fn error_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }

    /// Append an error message, preserving order. Blank additions are
    /// ignored.
    #[must_use]
    pub fn add_error_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if !message.trim().is_empty() {
            self.error_messages.push(message);
        }
        self
    }

    /// Append one warning code.
    #[must_use]
    pub fn add_warning_code(mut self, warning_code: impl Into<String>) -> Self {
        self.warning_codes.push(warning_code.into());
        self
    }

    /// Replace the warning codes wholesale.
    #[must_use]
    pub fn warning_codes(mut self, warning_codes: Vec<String>) -> Self {
        self.warning_codes = warning_codes;
        self
    }

    /// Set when the request arrived.
    #[must_use]
    pub fn requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = Some(at);
        self
    }

    /// Set when processing started.
    #[must_use]
    pub fn process_start_at(mut self, at: DateTime<Utc>) -> Self {
        self.process_start_at = Some(at);
        self
    }

    /// Set when processing ended. When left unset, finalizing a terminal
    /// event stamps the current time.
    #[must_use]
    pub fn process_end_at(mut self, at: DateTime<Utc>) -> Self {
        self.process_end_at = Some(at);
        self
    }

    /// Finalize the event into its immutable form.
    ///
    /// For `Response` and `Failure` events the response time is computed as
    /// process end minus process start, clamped to zero if clock skew would
    /// make it negative. Other stages carry no response time.
    #[must_use]
    pub fn build(self) -> TransactionEvent {
        let mut process_end_at = self.process_end_at;
        let response_time_millis = if self.transaction_type.is_terminal() {
            let end = process_end_at.unwrap_or_else(Utc::now);
            process_end_at = Some(end);
            let start = self.process_start_at.unwrap_or(end);
            let millis = (end - start).num_milliseconds().max(0);
            Some(millis as u64)
        } else {
            None
        };

        TransactionEvent {
            transaction_id: self.transaction_id,
            api: self.api,
            source_channel: self.source_channel,
            environment: self.environment,
            transaction_type: self.transaction_type,
            error_code: self.error_code,
            error_messages: self.error_messages,
            warning_codes: self.warning_codes,
            requested_at: self.requested_at,
            process_start_at: self.process_start_at,
            process_end_at,
            response_time_millis,
        }
    }
}
