//! Engine error types and their machine-readable kinds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error classification attached to failed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing price or signal for an expected date. Recoverable.
    DataGap,
    /// Stale/negative/NaN price or unsortable dates. Fails the run.
    DataIntegrity,
    /// Invalid configuration, rejected before simulation starts.
    ConfigurationError,
    /// Operator-initiated abort.
    Cancelled,
    /// Read attempted against a non-terminal run.
    NotReady,
}

impl ErrorKind {
    /// Whether an error of this kind, raised during a run, ends it `failed`.
    ///
    /// `DataGap` is absorbed as a warning. `NotReady` is a read-path condition
    /// and never reaches a run record.
    pub fn fails_run(self) -> bool {
        match self {
            ErrorKind::DataGap | ErrorKind::NotReady => false,
            ErrorKind::DataIntegrity | ErrorKind::ConfigurationError | ErrorKind::Cancelled => {
                true
            }
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::DataGap => "DataGap",
            ErrorKind::DataIntegrity => "DataIntegrity",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::NotReady => "NotReady",
        };
        f.write_str(name)
    }
}

/// Errors raised by the simulation engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("data gap on {date}: {detail}")]
    DataGap { date: NaiveDate, detail: String },

    #[error("data integrity violation on {date}: {detail}")]
    DataIntegrity { date: NaiveDate, detail: String },

    #[error("invalid input data: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("run cancelled before {date}")]
    Cancelled { date: NaiveDate },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::DataGap { .. } => ErrorKind::DataGap,
            EngineError::DataIntegrity { .. } | EngineError::InvalidInput(_) => {
                ErrorKind::DataIntegrity
            }
            EngineError::Configuration(_) => ErrorKind::ConfigurationError,
            EngineError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn integrity(date: NaiveDate, detail: impl Into<String>) -> Self {
        EngineError::DataIntegrity {
            date,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_run_outcome() {
        assert!(!ErrorKind::DataGap.fails_run());
        assert!(!ErrorKind::NotReady.fails_run());
        assert!(ErrorKind::DataIntegrity.fails_run());
        assert!(ErrorKind::ConfigurationError.fails_run());
        assert!(ErrorKind::Cancelled.fails_run());
    }

    #[test]
    fn engine_errors_report_their_kind() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            EngineError::integrity(date, "NaN close for SPY").kind(),
            ErrorKind::DataIntegrity
        );
        assert_eq!(EngineError::Cancelled { date }.kind(), ErrorKind::Cancelled);
        assert_eq!(
            EngineError::Configuration("bad".into()).kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn display_is_a_plain_summary() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let msg = EngineError::Cancelled { date }.to_string();
        assert_eq!(msg, "run cancelled before 2024-05-01");
    }
}
