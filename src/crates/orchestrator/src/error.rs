//! Orchestrator error type.

use crate::status::Stage;
use std::fmt::Display;
use thiserror::Error;
use transport::ErrorKind;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur while running a workflow.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// A pipeline stage failed. Every stage failure reaches the caller in
    /// this form.
    #[error("stage {stage} failed: {message}")]
    Stage {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },

    /// Settings or credentials are missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The workflow request itself is unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A remote service call failed.
    #[error("{service}: {message}")]
    Service {
        service: String,
        kind: ErrorKind,
        message: String,
    },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Stage { kind, .. } | OrchestratorError::Service { kind, .. } => *kind,
            OrchestratorError::Configuration(_) | OrchestratorError::InvalidRequest(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// The stage that failed, for stage errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OrchestratorError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub(crate) fn service(service: &str, kind: ErrorKind, err: impl Display) -> Self {
        OrchestratorError::Service {
            service: service.to_string(),
            kind,
            message: err.to_string(),
        }
    }

    /// Wrap `err` as a failure of `stage`, keeping its kind.
    pub(crate) fn at_stage(stage: Stage, err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Stage { .. } => err,
            other => OrchestratorError::Stage {
                stage,
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}
