//! Error types for the analytics pipeline

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for analytics operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Errors that can occur while building or analysing a series.
///
/// `Parse` is structural and aborts a pipeline call. `InsufficientData` and
/// `NoData` are steady-state conditions: callers present them as
/// "unavailable" instead of failing.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Malformed input: {message}")]
    Parse { message: String },

    #[error("Insufficient data: need at least {needed} samples, have {have}")]
    InsufficientData { needed: usize, have: usize },

    #[error("No samples available for {date}")]
    NoData { date: NaiveDate },

    #[error("Invalid window: {message}")]
    InvalidWindow { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Report encoding error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl AnalyticsError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        AnalyticsError::Parse {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_window(message: impl Into<String>) -> Self {
        AnalyticsError::InvalidWindow {
            message: message.into(),
        }
    }

    /// True for the data-insufficiency conditions that callers are expected
    /// to branch on rather than surface as failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AnalyticsError::InsufficientData { .. } | AnalyticsError::NoData { .. }
        )
    }
}

impl From<config::ConfigError> for AnalyticsError {
    fn from(err: config::ConfigError) -> Self {
        AnalyticsError::Config {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for AnalyticsError {
    fn from(err: csv::Error) -> Self {
        AnalyticsError::Parse {
            message: format!("CSV decoding failed: {}", err),
        }
    }
}
