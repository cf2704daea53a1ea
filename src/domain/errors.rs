use crate::domain::ml::lifecycle::RequestState;
use thiserror::Error;

/// Message shown to callers for failures that carry no actionable detail.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate prediction";

/// Errors raised by the normalize -> window -> train -> predict pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(
        "Insufficient historical data for prediction: need at least {required} days, got {actual}"
    )]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid price series: {reason}")]
    InvalidSeries { reason: String },

    #[error("Invalid model spec field `{field}`: {reason}")]
    InvalidSpec { field: &'static str, reason: String },

    #[error("Training failed at epoch {epoch}: {reason}")]
    TrainingFailure { epoch: usize, reason: String },

    #[error("Forward pass failed: {reason}")]
    PredictionFailure { reason: String },

    #[error("A prediction is already running for this session")]
    SessionBusy,

    #[error("Prediction cancelled after {completed_epochs} epochs")]
    Cancelled { completed_epochs: usize },

    #[error("Prediction timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },

    #[error("Numeric backend has not been initialized")]
    BackendUninitialized,

    #[error("Illegal request transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: RequestState,
        to: RequestState,
    },
}

impl PipelineError {
    /// Text surfaced to the interactive caller.
    ///
    /// Data-shape and session problems are shown verbatim; numeric failures are collapsed
    /// into the generic message.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::TrainingFailure { .. }
            | PipelineError::PredictionFailure { .. }
            | PipelineError::BackendUninitialized
            | PipelineError::InvalidTransition { .. } => GENERIC_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// True when the failure happened before any model was trained.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InsufficientData { .. }
                | PipelineError::InvalidSeries { .. }
                | PipelineError::InvalidSpec { .. }
        )
    }
}

/// Errors related to historical market data retrieval
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("Invalid stock symbol: {symbol}")]
    InvalidSymbol { symbol: String },

    #[error("No data available for stock symbol {symbol}")]
    NoData { symbol: String },

    #[error("API rate limit exceeded. Please try again in a minute.")]
    RateLimitExceeded,

    #[error("Invalid price data for {symbol}: {reason}")]
    InvalidData { symbol: String, reason: String },

    #[error("Market data request failed: {reason}")]
    Transport { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_formatting() {
        let err = PipelineError::InsufficientData {
            required: 15,
            actual: 4,
        };

        let msg = err.user_message();
        assert!(msg.contains("15"));
        assert!(msg.contains("4"));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_numeric_failures_use_generic_message() {
        let training = PipelineError::TrainingFailure {
            epoch: 3,
            reason: "loss is NaN".to_string(),
        };
        let forward = PipelineError::PredictionFailure {
            reason: "output is inf".to_string(),
        };

        assert_eq!(training.user_message(), GENERIC_FAILURE_MESSAGE);
        assert_eq!(forward.user_message(), GENERIC_FAILURE_MESSAGE);
        assert!(training.to_string().contains("epoch 3"));
        assert!(!training.is_input_error());
    }

    #[test]
    fn test_market_data_error_formatting() {
        let err = MarketDataError::InvalidSymbol {
            symbol: "ZZZZ".to_string(),
        };
        assert!(err.to_string().contains("ZZZZ"));

        let err = MarketDataError::RateLimitExceeded;
        assert!(err.to_string().contains("rate limit"));
    }
}
