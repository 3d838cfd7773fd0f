use thiserror::Error;

/// Unexpected input or configuration. "No setup" outcomes are holds, not errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("candle {index}: {field} is not a finite number")]
    NonFiniteValue { index: usize, field: &'static str },

    #[error("candle {index}: {reason}")]
    InvalidOhlc { index: usize, reason: String },

    #[error("candle {index}: timestamp is not after the previous candle")]
    UnorderedTimestamps { index: usize },

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("invalid external input: {0}")]
    InvalidExternalInput(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
