//! Error types for the summarizer client.

use thiserror::Error;
use transport::{Classify, ErrorKind, RequestError};

/// Result type for summarizer operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur while generating a summary.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The model refused to answer; `reason` is the finish or block reason.
    #[error("content blocked by safety filters ({reason}): {message}")]
    Blocked { reason: String, message: String },

    /// The model answered with no text.
    #[error("empty response from {0}")]
    EmptyResponse(String),

    /// The response could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Missing API key, bad model name, unusable prompt template.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Request(#[from] RequestError),
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Configuration(_) => ErrorKind::Configuration,
            LlmError::Request(e) => e.kind(),
            _ => ErrorKind::Integration,
        }
    }

    /// Whether another attempt with cleaner input might succeed.
    pub fn is_blocked(&self) -> bool {
        matches!(self, LlmError::Blocked { .. })
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}
