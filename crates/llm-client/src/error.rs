use analysis_core::AnalysisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("LLM API key is not configured")]
    NotConfigured,

    #[error("No document has been loaded. Please upload a document first.")]
    NoDocument,
}

pub type LlmResult<T> = Result<T, LlmError>;

impl From<LlmError> for AnalysisError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NoDocument => AnalysisError::InvalidInput(err.to_string()),
            other => AnalysisError::ExternalService(other.to_string()),
        }
    }
}
