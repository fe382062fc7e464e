//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for portopt.
///
/// Optimizer non-convergence is deliberately absent: it is reported through
/// [`crate::domain::optimizer::OptimizationResult`] rather than as an error.
#[derive(Debug, thiserror::Error)]
pub enum PortoptError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid asset universe: {reason}")]
    InvalidUniverse { reason: String },

    #[error("market data unavailable for {asset}: {reason}")]
    DataUnavailable { asset: String, reason: String },

    #[error("insufficient history for {asset}: have {observations} observations, need {minimum}")]
    InsufficientHistory {
        asset: String,
        observations: usize,
        minimum: usize,
    },

    #[error("missing observation for {asset} on {date}")]
    DataGap { asset: String, date: NaiveDate },

    #[error("invalid price for {asset} on {date}: {price}")]
    InvalidPrice {
        asset: String,
        date: NaiveDate,
        price: f64,
    },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&PortoptError> for std::process::ExitCode {
    fn from(err: &PortoptError) -> Self {
        let code: u8 = match err {
            PortoptError::Io(_) => 1,
            PortoptError::ConfigParse { .. }
            | PortoptError::ConfigMissing { .. }
            | PortoptError::ConfigInvalid { .. }
            | PortoptError::InvalidUniverse { .. } => 2,
            PortoptError::DataUnavailable { .. } => 3,
            PortoptError::InsufficientHistory { .. }
            | PortoptError::DataGap { .. }
            | PortoptError::InvalidPrice { .. } => 5,
            PortoptError::InvalidInput { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
