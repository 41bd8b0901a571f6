//! Error types for NI 4050 operations.
//!
//! Every failure the measurement engine can report is a [`DmmError`]. The
//! variants map one-to-one onto the outcomes a caller of the command
//! dispatcher can observe; none of them are retried internally.

use thiserror::Error;

use crate::range::Range;

/// Result type alias for NI 4050 operations.
pub type Result<T> = std::result::Result<T, DmmError>;

/// Errors that can occur while driving an NI 4050 unit.
#[derive(Error, Debug)]
pub enum DmmError {
    /// The requested range identifier has no profile.
    #[error("Range {range} is not supported")]
    NotFound {
        /// Identifier as requested
        range: i32,
    },

    /// Calibrated internal resistance lies outside the accepted window.
    #[error("Internal resistance {value} ohm is out of spec (expected {min}..={max})")]
    OutOfSpec {
        /// Value read, in ohms
        value: u32,
        /// Lower bound
        min: u32,
        /// Upper bound
        max: u32,
    },

    /// A readiness or data-ready poll exhausted its iteration budget.
    #[error("Timed out waiting for {what} after {attempts} polls")]
    Timeout {
        /// Condition waited for
        what: &'static str,
        /// Polls made
        attempts: u32,
    },

    /// The unit already has an open session.
    #[error("Unit {unit} is busy (already opened by another session)")]
    Busy {
        /// Unit instance index
        unit: usize,
    },

    /// Operation deliberately not provided by this driver.
    #[error("Operation not supported: {message}")]
    NotSupported {
        /// What was refused
        message: String,
    },

    /// Unrecognised request code.
    #[error("Request code {code} is not implemented")]
    NotImplemented {
        /// Raw control code
        code: u32,
    },

    /// The unit is not attached (or was detached under an open session).
    #[error("Unit {unit} is not available")]
    Unavailable {
        /// Unit instance index
        unit: usize,
    },

    /// Extended-ohm divider conversion saturated near full scale.
    #[error("Reading on {range} saturated (scale {scale})")]
    Overrange {
        /// Range of the reading
        range: Range,
        /// Scale fraction of the raw code
        scale: f64,
    },

    /// Every unit slot is already in use.
    #[error("Unit registry error: {message}")]
    Registry {
        /// Failure detail
        message: String,
    },

    /// I/O error from the register window.
    #[error("Register port I/O error: {0}")]
    Port(#[from] std::io::Error),

    /// Invalid driver configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DmmError {
    /// Check if this is a poll timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the unit is busy.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Check if this is an unsupported range.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the unit has gone away.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<figment::Error> for DmmError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DmmError::OutOfSpec {
            value: 1_300_000,
            min: 800_000,
            max: 1_200_000,
        };
        assert!(err.to_string().contains("1300000"));
        assert!(err.to_string().contains("1200000"));

        let err = DmmError::Timeout {
            what: "ADC ready",
            attempts: 100,
        };
        assert!(err.to_string().contains("ADC ready"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_predicates() {
        assert!(DmmError::Busy { unit: 1 }.is_busy());
        assert!(DmmError::NotFound { range: 42 }.is_not_found());
        assert!(DmmError::Unavailable { unit: 0 }.is_unavailable());
        assert!(!DmmError::NotImplemented { code: 9 }.is_busy());
    }
}
