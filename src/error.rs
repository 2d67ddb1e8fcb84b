//! Error taxonomy for training and serving

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised by the feature builder, the classifier and the artifact store
#[derive(Error, Debug)]
pub enum ChurnError {
    /// Input table is missing a required column or holds unparseable values
    #[error("schema error: {0}")]
    Schema(String),

    /// No customer survived the transaction/customer join
    #[error("no joinable customer records: {0}")]
    EmptyInput(String),

    /// The training partition carries a single churn label
    #[error("insufficient classes: training partition only contains label {label} ({count} records)")]
    InsufficientClasses { label: u8, count: usize },

    /// Malformed prediction request
    #[error("invalid prediction request: {0}")]
    Shape(String),

    #[error("unsupported artifact format version {found} (expected {expected})")]
    UnsupportedArtifact { found: u32, expected: u32 },

    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),

    #[error("artifact encoding error: {0}")]
    Artifact(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChurnError {
    /// Whether the error only concerns a single request and leaves shared state untouched
    pub fn is_request_error(&self) -> bool {
        matches!(self, ChurnError::Shape(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors_are_isolated() {
        assert!(ChurnError::Shape("monetary is negative".into()).is_request_error());
        assert!(!ChurnError::EmptyInput("no rows".into()).is_request_error());
        assert!(!ChurnError::InsufficientClasses { label: 0, count: 4 }.is_request_error());
    }

    #[test]
    fn test_error_messages() {
        let err = ChurnError::InsufficientClasses { label: 1, count: 7 };
        assert_eq!(
            err.to_string(),
            "insufficient classes: training partition only contains label 1 (7 records)"
        );
        let err = ChurnError::Schema("missing column 'amount' in transactions".into());
        assert!(err.to_string().contains("amount"));
    }
}
