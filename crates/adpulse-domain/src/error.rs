//! Domain errors.

use thiserror::Error;

/// Errors raised while parsing domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A string did not name a known enum variant.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// The job type cannot analyze the given reference type.
    #[error("{job_type} jobs must reference a {expected}, got {actual}")]
    ReferenceMismatch {
        job_type: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
}

impl DomainError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}
