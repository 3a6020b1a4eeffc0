//! Error handling for the BSP Framework
//!
//! Structural and parameter errors are reported here. Data-sufficiency
//! problems inside feature extraction are not errors; they are carried as
//! [`UndefinedFeature`](crate::UndefinedFeature) markers in a feature vector.

use thiserror::Error;

/// Result type alias for BSP Framework operations
pub type BspResult<T> = Result<T, BspError>;

/// Error type for all BSP Framework operations
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum BspError {
    /// Malformed or out-of-range filter parameters
    #[error("Invalid filter specification: {reason}")]
    InvalidFilterSpec {
        /// Description of the offending parameter
        reason: String,
    },

    /// Signal shorter than a component's minimum working length
    #[error("Insufficient signal length: {required} samples required, got {actual}")]
    InsufficientSignalLength {
        /// Minimum number of samples needed
        required: usize,
        /// Number of samples supplied
        actual: usize,
    },

    /// The whole signal produced zero committed events
    #[error("No events detected in {samples} samples")]
    NoEventsDetected {
        /// Length of the scanned signal
        samples: usize,
    },

    /// Invalid sample data (non-finite values, bad lengths)
    #[error("Invalid signal data: {reason}")]
    InvalidSignalData {
        /// Description of the data issue
        reason: String,
    },

    /// Sampling rate is not strictly positive and finite
    #[error("Invalid sampling rate: {rate}Hz (must be finite and > 0)")]
    InvalidSamplingRate {
        /// Provided sampling rate
        rate: f64,
    },

    /// Out-of-range configuration value
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration issue
        message: String,
    },

    /// Event series violates ordering or refractory invariants
    #[error("Invalid event series: {reason}")]
    InvalidEventSeries {
        /// Description of the violated invariant
        reason: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Serializer message
        message: String,
    },
}

impl BspError {
    /// Whether the condition is a reported outcome rather than a failed call.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BspError::NoEventsDetected { .. })
    }
}

/// Convenience macro for creating filter specification errors
#[macro_export]
macro_rules! filter_error {
    ($($arg:tt)+) => {
        $crate::error::BspError::InvalidFilterSpec {
            reason: format!($($arg)+),
        }
    };
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)+) => {
        $crate::error::BspError::ConfigurationError {
            message: format!($($arg)+),
        }
    };
}
