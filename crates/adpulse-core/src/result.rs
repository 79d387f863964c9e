//! Result type aliases for AdPulse.

use crate::AdpulseError;

/// A specialized `Result` type for AdPulse operations.
pub type AdpulseResult<T> = Result<T, AdpulseError>;
