//! Node execution errors

use loramix_lora::MergeError;
use thiserror::Error;

/// Errors surfaced to the host at the failing node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Inputs did not match the node's declared schema
    #[error("Invalid node input: {0}")]
    InvalidInput(String),

    /// No node registered under this class type
    #[error("Unknown node class: {0}")]
    UnknownNode(String),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
