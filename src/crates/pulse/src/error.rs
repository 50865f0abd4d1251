//! Error types for the pulse binary.

use orchestrator::OrchestratorError;
use thiserror::Error;

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, PulseError>;

#[derive(Debug, Error)]
pub enum PulseError {
    /// A config file could not be read, parsed or applied.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad command-line input.
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Integration(#[from] integrations::IntegrationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
