//! Custom error types for the application.
//!
//! This module defines the primary error type, `GaugeError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur while talking to the gauge and persisting its readings.
//!
//! ## Error Hierarchy
//!
//! - **`Transport`**: Serial I/O failure (disconnection, invalid port). Aborts the run.
//! - **`Timeout`**: The gauge did not answer within the configured window. Aborts the
//!   run; there is no automatic retry.
//! - **`Protocol`**: Malformed frame, bad checksum, wrong address echo or a device error
//!   marker. Aborts the run.
//! - **`Schema`**: An existing store file does not have the expected five-column layout.
//!   Raised at startup, before the first cycle.
//! - **`Config`** / **`Configuration`**: Parse errors from the `config` crate, and
//!   semantic validation errors on values that parsed fine.
//! - **`Storage`**: A storage backend failed to write or flush.
//! - **`FeatureNotEnabled`**: The requested serial or storage backend was not compiled in.
//!
//! A channel without a reading is *not* an error: it is represented by
//! [`Reading::Unavailable`](crate::measurement::Reading::Unavailable).

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, GaugeError>;

/// Every failure the gauge logger can surface.
#[derive(Error, Debug)]
pub enum GaugeError {
    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but holds an invalid value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Serial link failure.
    #[error("Serial transport error: {0}")]
    Transport(String),

    /// No complete response within the configured window.
    #[error("No response from gauge within {0:?}")]
    Timeout(Duration),

    /// Response violated the device protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Existing store is incompatible with the expected layout.
    #[error("Store schema error: {0}")]
    Schema(String),

    /// Storage backend failure while appending or flushing.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Plain file-system I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend disabled at compile time.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl GaugeError {
    /// Whether this error belongs to the gauge communication path
    /// (transport, timeout or protocol) rather than storage or configuration.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            GaugeError::Transport(_) | GaugeError::Timeout(_) | GaugeError::Protocol(_)
        )
    }
}

#[cfg(feature = "storage_csv")]
impl From<csv::Error> for GaugeError {
    fn from(err: csv::Error) -> Self {
        GaugeError::Storage(err.to_string())
    }
}

#[cfg(feature = "storage_hdf5")]
impl From<hdf5::Error> for GaugeError {
    fn from(err: hdf5::Error) -> Self {
        GaugeError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn communication_errors_are_classified() {
        assert!(GaugeError::Transport("port vanished".into()).is_communication());
        assert!(GaugeError::Timeout(Duration::from_secs(1)).is_communication());
        assert!(GaugeError::Protocol("bad crc".into()).is_communication());
        assert!(!GaugeError::Schema("missing column".into()).is_communication());
        assert!(!GaugeError::Storage("disk full".into()).is_communication());
    }

    #[test]
    fn feature_error_names_the_flag() {
        let err = GaugeError::FeatureNotEnabled("storage_hdf5".into());
        assert!(err.to_string().contains("--features storage_hdf5"));
    }
}
