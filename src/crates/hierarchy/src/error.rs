//! Error types for hierarchy resolution.

use thiserror::Error;
use transport::{Classify, ErrorKind, RequestError};

/// Result type for hierarchy operations.
pub type Result<T> = std::result::Result<T, HierarchyError>;

#[derive(Debug, Clone, Error)]
pub enum HierarchyError {
    /// No directory entry matched the identifier.
    #[error("'{0}' was not found in the directory")]
    NotFound(String),

    /// More than one directory entry matched the identifier.
    #[error("'{identifier}' matched {count} directory entries")]
    Ambiguous { identifier: String, count: usize },

    /// A node with this identifier is already part of the tree.
    #[error("node '{0}' is already placed in the tree")]
    DuplicateNode(String),

    /// The referenced parent is not part of the tree.
    #[error("parent node '{0}' is not in the tree")]
    UnknownParent(String),

    #[error(transparent)]
    Request(#[from] RequestError),

    /// A backend returned data that could not be interpreted.
    #[error("backend error: {0}")]
    Backend(String),
}

impl HierarchyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HierarchyError::Request(e) => e.kind(),
            _ => ErrorKind::Integration,
        }
    }
}
