//! Error types for loading and merging LoRAs

use crate::weights::TensorSpec;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating, loading or merging LoRA weights
#[derive(Debug, Error)]
pub enum MergeError {
    /// Input file is missing, unreadable or not valid safetensors
    #[error("Failed to load {}: {reason}", path.display())]
    FileLoad { path: PathBuf, reason: String },

    /// LoRA name did not resolve under any search path
    #[error("LoRA '{name}' not found in {} search path(s)", searched.len())]
    LoraNotFound { name: String, searched: Vec<PathBuf> },

    /// Shared key whose tensors cannot be combined
    #[error("Incompatible tensors for '{key}': {left} vs {right}")]
    IncompatibleShape {
        key: String,
        left: TensorSpec,
        right: TensorSpec,
    },

    /// Strength outside [-100, 100] or not finite
    #[error("Strength {value} is outside the allowed range [-100, 100]")]
    InvalidStrength { value: f64 },

    /// Merge method cannot be applied to a key family
    #[error("Merge method '{method}' cannot be applied to '{key}': {reason}")]
    UnsupportedMergeMethod {
        method: String,
        key: String,
        reason: String,
    },

    /// Unrecognized merge method name
    #[error("Unknown merge method: {0}")]
    UnknownMergeMethod(String),

    /// Malformed merge recipe
    #[error("Invalid recipe: {0}")]
    Recipe(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    /// Whether this error stems from reading an input file
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            Self::FileLoad { .. } | Self::LoraNotFound { .. } | Self::Io(_)
        )
    }
}

/// Result type for LoRA operations
pub type Result<T> = std::result::Result<T, MergeError>;
