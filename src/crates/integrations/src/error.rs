//! Error types for service integrations.

use hierarchy::HierarchyError;
use thiserror::Error;
use transport::{Classify, ErrorKind, RequestError};

/// Result type for integration operations.
pub type Result<T> = std::result::Result<T, IntegrationError>;

#[derive(Debug, Clone, Error)]
pub enum IntegrationError {
    /// The caller asked for something the service cannot answer.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Required settings or credentials are missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The service answered, but not in the expected shape.
    #[error("unexpected response from {service}: {message}")]
    Response { service: String, message: String },

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

impl IntegrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntegrationError::Configuration(_) => ErrorKind::Configuration,
            IntegrationError::Request(e) => e.kind(),
            IntegrationError::Hierarchy(e) => e.kind(),
            IntegrationError::InvalidQuery(_) | IntegrationError::Response { .. } => {
                ErrorKind::Integration
            }
        }
    }

    pub(crate) fn response(service: &str, message: impl Into<String>) -> Self {
        IntegrationError::Response {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

impl From<IntegrationError> for HierarchyError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::Request(e) => HierarchyError::Request(e),
            IntegrationError::Hierarchy(e) => e,
            other => HierarchyError::Backend(other.to_string()),
        }
    }
}
