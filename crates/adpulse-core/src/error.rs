//! Unified error types for all layers of the application.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for AdPulse.
///
/// Lower layers keep their own error enums (`JobError` in `adpulse-jobs`) and
/// convert into this one at the service boundary, where it maps onto HTTP
/// status codes and machine-readable error codes.
#[derive(Error, Debug)]
pub enum AdpulseError {
    // ============ Domain Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., duplicate job id)
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ Infrastructure Errors ============
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Redis error outside of the queue path
    #[error("Redis error: {0}")]
    Redis(String),

    /// The task queue refused a descriptor
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AdpulseError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::QueueUnavailable(_) | Self::Timeout(_) => 503,
            Self::Database(_)
            | Self::Redis(_)
            | Self::Configuration(_)
            | Self::Internal(_)
            | Self::Other(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if the caller may retry the operation unchanged.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Redis(_) | Self::QueueUnavailable(_) | Self::Timeout(_)
        )
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for AdpulseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound {
                resource_type: "database_row",
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                // PostgreSQL unique violation
                if db_err.code().as_deref() == Some("23505") {
                    return Self::Conflict(db_err.message().to_string());
                }
                Self::Database(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AdpulseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error body for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request trace ID for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response from an `AdpulseError`.
    #[must_use]
    pub fn from_error(error: &AdpulseError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            trace_id: None,
        }
    }

    /// Sets the trace ID.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

impl From<&AdpulseError> for ErrorResponse {
    fn from(error: &AdpulseError) -> Self {
        Self::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(AdpulseError::not_found("Job", "j-1").status_code(), 404);
        assert_eq!(AdpulseError::validation("missing file path").status_code(), 400);
        assert_eq!(AdpulseError::conflict("duplicate").status_code(), 409);
        assert_eq!(AdpulseError::QueueUnavailable("down".to_string()).status_code(), 503);
        assert_eq!(AdpulseError::Timeout("slow".to_string()).status_code(), 503);
        assert_eq!(AdpulseError::Database("db".to_string()).status_code(), 500);
        assert_eq!(AdpulseError::internal("oops").status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AdpulseError::not_found("Job", 1).error_code(), "NOT_FOUND");
        assert_eq!(AdpulseError::validation("bad").error_code(), "VALIDATION_ERROR");
        assert_eq!(
            AdpulseError::QueueUnavailable("x".to_string()).error_code(),
            "QUEUE_UNAVAILABLE"
        );
        assert_eq!(AdpulseError::Redis("x".to_string()).error_code(), "REDIS_ERROR");
        assert_eq!(AdpulseError::internal("err").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(AdpulseError::QueueUnavailable("full".to_string()).is_retriable());
        assert!(AdpulseError::Database("connection lost".to_string()).is_retriable());
        assert!(!AdpulseError::validation("bad input").is_retriable());
        assert!(!AdpulseError::not_found("Job", 1).is_retriable());
        assert!(!AdpulseError::conflict("dup").is_retriable());
    }

    #[test]
    fn test_error_constructors() {
        let not_found = AdpulseError::not_found("Job", "abc");
        assert!(not_found.to_string().contains("Job"));
        assert!(not_found.to_string().contains("abc"));

        let validation = AdpulseError::validation("invalid field");
        assert!(validation.to_string().contains("invalid field"));
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: AdpulseError = anyhow::anyhow!("wrapped").into();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(err.to_string(), "wrapped");
    }

    #[test]
    fn test_error_response_from_error() {
        let err = AdpulseError::not_found("Job", 1);
        let response = ErrorResponse::from_error(&err);
        assert_eq!(response.code, "NOT_FOUND");
        assert!(!response.message.is_empty());
        assert!(response.trace_id.is_none());

        let traced = ErrorResponse::from(&err).with_trace_id("trace-123");
        assert_eq!(traced.trace_id.as_deref(), Some("trace-123"));
    }
}
