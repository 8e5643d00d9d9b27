//! Error types and reporting for pipeline stations.

use std::fmt;

/// Errors that can occur during station processing.
#[derive(Debug, Clone, PartialEq)]
pub enum StationError {
    /// Recoverable error: the current item is skipped, the station continues.
    Recoverable(String),
    /// Fatal error: the station stops and closes its output stream.
    Fatal(String),
    /// The turn was cancelled. Not a failure, just the unwind path.
    Cancelled,
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StationError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
            StationError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for StationError {}

/// Trait for reporting station errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a station.
    fn report(&self, station: &str, error: &StationError);
}

/// Error reporter that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        match error {
            StationError::Recoverable(msg) => {
                tracing::warn!(station, "{msg}");
            }
            StationError::Fatal(msg) => {
                tracing::error!(station, "{msg}");
            }
            StationError::Cancelled => {
                tracing::debug!(station, "cancellation observed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_error_display() {
        let recoverable = StationError::Recoverable("temporary failure".to_string());
        assert_eq!(
            recoverable.to_string(),
            "Recoverable error: temporary failure"
        );

        let fatal = StationError::Fatal("critical failure".to_string());
        assert_eq!(fatal.to_string(), "Fatal error: critical failure");

        assert_eq!(StationError::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        // Just ensure it doesn't panic
        reporter.report("TestStation", &StationError::Recoverable("oops".to_string()));
        reporter.report("TestStation", &StationError::Fatal("boom".to_string()));
        reporter.report("TestStation", &StationError::Cancelled);
    }
}
