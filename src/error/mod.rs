// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Boxed error type accepted from protected operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SeawallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit exceeded for category '{category}', retry in {retry_after:?}")]
    RateLimitExceeded {
        category: String,
        retry_after: Duration,
    },

    #[error("Circuit breaker '{}' is open{}", .name, retry_hint(.retry_after))]
    CircuitOpen {
        name: String,
        retry_after: Option<Duration>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation failed: {0}")]
    Operation(#[source] BoxError),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", will retry after {:?}", d),
        None => String::new(),
    }
}

impl SeawallError {
    /// Wrap an arbitrary operation error.
    pub fn operation(err: impl Into<BoxError>) -> Self {
        SeawallError::Operation(err.into())
    }

    /// Stable code identifying the failure class in transaction events.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SeawallError::Config(_) => "ERR-CONFIG",
            SeawallError::RateLimitExceeded { .. } => "ERR-429",
            SeawallError::CircuitOpen { .. } => "ERR-SHORTCIRCUIT",
            SeawallError::Timeout(_) => "ERR-TIMEOUT",
            SeawallError::Operation(_) => "ERR-000",
        }
    }

    /// Whether the condition is expected to clear on its own (overload or a
    /// tripped breaker, as opposed to a failed operation).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SeawallError::RateLimitExceeded { .. } | SeawallError::CircuitOpen { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SeawallError>;

/// Structured error object embedded in degraded responses.
///
/// Callers return this inside an otherwise well-formed response body instead
/// of failing the transaction, so clients handle success and failure shapes
/// uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_message: Option<String>,
}

impl ErrorDescriptor {
    #[must_use]
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            tech_message: None,
        }
    }

    /// Attach a technical detail message.
    #[must_use]
    pub fn with_tech_message(mut self, tech_message: impl Into<String>) -> Self {
        self.tech_message = Some(tech_message.into());
        self
    }

    /// Build a descriptor from a guard error, using the taxonomy's stable
    /// codes and a client-safe message.
    #[must_use]
    pub fn from_error(err: &SeawallError) -> Self {
        let message = match err {
            SeawallError::RateLimitExceeded { .. } => {
                "Rate limit exceeded. Please try again in a few seconds."
            }
            SeawallError::CircuitOpen { .. } => {
                "Service temporarily degraded. Please try again later."
            }
            SeawallError::Timeout(_) => "The request timed out.",
            _ => "The request could not be completed.",
        };
        Self::new(err.error_code(), message).with_tech_message(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SeawallError::RateLimitExceeded {
                category: "write".to_string(),
                retry_after: Duration::from_secs(1),
            }
            .error_code(),
            "ERR-429"
        );
        assert_eq!(
            SeawallError::CircuitOpen {
                name: "default-api".to_string(),
                retry_after: None,
            }
            .error_code(),
            "ERR-SHORTCIRCUIT"
        );
        assert_eq!(
            SeawallError::Timeout(Duration::from_millis(200)).error_code(),
            "ERR-TIMEOUT"
        );
        assert_eq!(
            SeawallError::operation("backend unavailable").error_code(),
            "ERR-000"
        );
    }

    #[test]
    fn test_is_rejection() {
        assert!(SeawallError::RateLimitExceeded {
            category: "read".to_string(),
            retry_after: Duration::from_secs(1),
        }
        .is_rejection());
        assert!(SeawallError::CircuitOpen {
            name: "x".to_string(),
            retry_after: Some(Duration::from_secs(5)),
        }
        .is_rejection());
        assert!(!SeawallError::operation("boom").is_rejection());
        assert!(!SeawallError::Timeout(Duration::from_secs(1)).is_rejection());
    }

    #[test]
    fn test_descriptor_from_error() {
        let err = SeawallError::CircuitOpen {
            name: "default-api".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        let desc = ErrorDescriptor::from_error(&err);
        assert_eq!(desc.error_code, "ERR-SHORTCIRCUIT");
        assert!(desc.message.contains("degraded"));
        assert!(desc.tech_message.unwrap().contains("default-api"));
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let desc = ErrorDescriptor::new("ERR-000", "Failure Response")
            .with_tech_message("root cause goes here");
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("\"errorCode\":\"ERR-000\""));
        assert!(json.contains("\"techMessage\""));
    }

    #[test]
    fn test_circuit_open_display_includes_hint() {
        let err = SeawallError::CircuitOpen {
            name: "default-api".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        let msg = err.to_string();
        assert!(msg.contains("default-api"));
        assert!(msg.contains("retry after"));

        let bare = SeawallError::CircuitOpen {
            name: "default-api".to_string(),
            retry_after: None,
        };
        assert!(!bare.to_string().contains("retry after"));
    }
}
