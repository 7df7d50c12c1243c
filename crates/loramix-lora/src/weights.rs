//! Tensor-keyed weight mappings
//!
//! A [`WeightMapping`] is the full parameter set of one LoRA file: a map from
//! tensor key to tensor. Merged outputs use the same type and are owned by the
//! caller once returned.

use crate::error::{MergeError, Result};
use candle_core::{DType, Tensor};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Shape and dtype of a single tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    /// Dimension sizes
    pub shape: Vec<usize>,
    /// Element type
    pub dtype: DType,
}

impl TensorSpec {
    /// Describe a tensor
    pub fn of(tensor: &Tensor) -> Self {
        Self {
            shape: tensor.dims().to_vec(),
            dtype: tensor.dtype(),
        }
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.shape, self.dtype.as_str())
    }
}

/// Mapping from tensor key to tensor
#[derive(Debug, Clone, Default)]
pub struct WeightMapping {
    tensors: HashMap<String, Tensor>,
}

impl WeightMapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing tensor map
    pub fn from_tensors(tensors: HashMap<String, Tensor>) -> Self {
        Self { tensors }
    }

    /// Insert a tensor, returning the previous one under that key
    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(key.into(), tensor)
    }

    /// Get a tensor by key
    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.tensors.get(key)
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    /// Iterate keys in arbitrary order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Keys in lexical order
    pub fn sorted_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        keys
    }

    /// Iterate over key/tensor pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of tensors
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Shape and dtype of a tensor
    pub fn spec(&self, key: &str) -> Option<TensorSpec> {
        self.get(key).map(TensorSpec::of)
    }

    /// Total element count over all tensors
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(Tensor::elem_count).sum()
    }

    /// Write the mapping as a safetensors file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        candle_core::safetensors::save(&self.tensors, path).map_err(|e| MergeError::FileLoad {
            path: path.to_path_buf(),
            reason: format!("write failed: {e}"),
        })?;

        tracing::info!(
            path = %path.display(),
            tensors = self.len(),
            "saved weight mapping"
        );
        Ok(())
    }
}

impl FromIterator<(String, Tensor)> for WeightMapping {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for WeightMapping {
    type Item = (String, Tensor);
    type IntoIter = std::collections::hash_map::IntoIter<String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.into_iter()
    }
}
