//! Job error types.

use adpulse_core::AdpulseError;
use adpulse_domain::EnvelopeError;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors raised on the queue, relay, and worker paths.
#[derive(Debug, Error)]
pub enum JobError {
    /// The task queue refused a descriptor.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// A worker message failed envelope validation.
    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] EnvelopeError),

    /// The ledger could not be written while handling an event.
    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Invalid job request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job was cancelled.
    #[error("Job was cancelled")]
    Cancelled,

    /// Job timed out.
    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    /// Job execution failed.
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QueueUnavailable(_)
                | Self::LedgerWrite(_)
                | Self::Timeout(_)
                | Self::Redis(_)
                | Self::Pool(_)
        )
    }

    /// Wraps a queue-side failure so callers see `QueueUnavailable`.
    #[must_use]
    pub fn queue_unavailable(err: impl std::fmt::Display) -> Self {
        Self::QueueUnavailable(err.to_string())
    }
}

impl From<AdpulseError> for JobError {
    fn from(err: AdpulseError) -> Self {
        match err {
            AdpulseError::Validation(msg) => Self::Validation(msg),
            AdpulseError::NotFound { id, .. } => Self::NotFound(id),
            AdpulseError::QueueUnavailable(msg) => Self::QueueUnavailable(msg),
            AdpulseError::Configuration(msg) => Self::Configuration(msg),
            AdpulseError::Database(msg) => Self::LedgerWrite(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JobError> for AdpulseError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::QueueUnavailable(msg) => Self::QueueUnavailable(msg),
            JobError::Validation(msg) => Self::Validation(msg),
            JobError::NotFound(id) => Self::not_found("job", id),
            JobError::LedgerWrite(msg) => Self::Database(msg),
            JobError::Timeout(secs) => Self::Timeout(format!("job timed out after {secs}s")),
            JobError::Redis(e) => Self::Redis(e.to_string()),
            JobError::Pool(e) => Self::Redis(e.to_string()),
            JobError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(JobError::QueueUnavailable("down".into()).is_retryable());
        assert!(JobError::LedgerWrite("pool timed out".into()).is_retryable());
        assert!(JobError::Timeout(30).is_retryable());
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!JobError::Cancelled.is_retryable());
        assert!(!JobError::Validation("bad".into()).is_retryable());
        assert!(!JobError::ExecutionFailed("decode failed".into()).is_retryable());
        assert!(!JobError::MalformedEvent(EnvelopeError::NotAnObject).is_retryable());
    }

    #[test]
    fn test_queue_unavailable_maps_to_503() {
        let err: AdpulseError = JobError::queue_unavailable("connection refused").into();
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.error_code(), "QUEUE_UNAVAILABLE");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_validation_round_trips_through_core_error() {
        let err: AdpulseError = JobError::Validation("file_path is empty".into()).into();
        assert_eq!(err.status_code(), 400);

        let back = JobError::from(err);
        assert!(matches!(back, JobError::Validation(msg) if msg == "file_path is empty"));
    }

    #[test]
    fn test_from_database_error() {
        let err = JobError::from(AdpulseError::Database("connection reset".into()));
        assert!(matches!(err, JobError::LedgerWrite(_)));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err: AdpulseError = JobError::NotFound("J1".into()).into();
        assert_eq!(err.status_code(), 404);
        assert!(err.to_string().contains("J1"));
    }

    #[test]
    fn test_error_display_timeout() {
        let err = JobError::Timeout(60);
        assert!(err.to_string().contains("60"));
    }
}
