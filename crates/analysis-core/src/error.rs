use thiserror::Error;

/// Failure kinds surfaced by every analysis stage.
///
/// A failed stage aborts the whole request; callers use [`AnalysisError::is_retryable`]
/// to tell transient upstream failures apart from permanent ones.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl AnalysisError {
    /// Only upstream service failures may succeed on a later attempt.
    /// Nothing in the pipeline retries automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::ExternalService(_))
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
