//! LoRA loading from disk

use crate::error::{MergeError, Result};
use crate::format::LoraFormat;
use crate::weights::WeightMapping;
use candle_core::Device;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum file size in bytes
    pub max_file_size: u64,
    /// Device tensors are materialized on
    pub device: Device,
    /// Load pairs of files concurrently
    pub parallel: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_file_size: 16 * 1024 * 1024 * 1024, // 16GB
            device: Device::Cpu,
            parallel: true,
        }
    }
}

/// Loaded LoRA data
#[derive(Debug, Clone)]
pub struct LoadedLora {
    /// Tensors keyed by name
    pub weights: WeightMapping,
    /// Source path
    pub source: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// blake3 hash of the file contents
    pub hash: [u8; 32],
}

impl LoadedLora {
    /// Hex-encoded content hash
    pub fn hash_hex(&self) -> String {
        hex_encode(&self.hash)
    }

    /// File name without directories
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Summarize the file
    pub fn info(&self) -> LoraInfo {
        let keys = self.weights.sorted_keys();
        let sample_shapes = keys
            .iter()
            .take(3)
            .filter_map(|k| self.weights.spec(k).map(|s| (k.to_string(), s.shape)))
            .collect();

        LoraInfo {
            name: self.file_name(),
            format: LoraFormat::detect(keys.iter().copied()),
            num_keys: keys.len(),
            num_parameters: self.weights.parameter_count(),
            size_bytes: self.size_bytes,
            sample_keys: keys.iter().take(5).map(|k| k.to_string()).collect(),
            sample_shapes,
            hash: self.hash_hex(),
        }
    }
}

/// Summary of one LoRA file
#[derive(Debug, Clone, Serialize)]
pub struct LoraInfo {
    /// File name
    pub name: String,
    /// Detected key layout
    pub format: LoraFormat,
    /// Number of tensors
    pub num_keys: usize,
    /// Total element count
    pub num_parameters: usize,
    /// File size in bytes
    pub size_bytes: u64,
    /// First keys in sorted order
    pub sample_keys: Vec<String>,
    /// Shapes of the first three keys
    pub sample_shapes: BTreeMap<String, Vec<usize>>,
    /// Hex content hash
    pub hash: String,
}

/// LoRA loader
#[derive(Debug, Clone, Default)]
pub struct LoraLoader {
    config: LoaderConfig,
}

impl LoraLoader {
    /// Create a new loader
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load a safetensors file
    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadedLora> {
        let path = path.as_ref();
        let file_error = |reason: String| MergeError::FileLoad {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(file_error("file does not exist".to_string()));
        }

        let metadata = std::fs::metadata(path).map_err(|e| file_error(e.to_string()))?;
        if metadata.len() > self.config.max_file_size {
            return Err(file_error(format!(
                "file too large: {} > {}",
                metadata.len(),
                self.config.max_file_size
            )));
        }

        // The file handle is dropped once the bytes are in memory.
        let bytes = std::fs::read(path).map_err(|e| file_error(e.to_string()))?;
        let hash = *blake3::hash(&bytes).as_bytes();

        let tensors = candle_core::safetensors::load_buffer(&bytes, &self.config.device)
            .map_err(|e| file_error(format!("not a valid safetensors file: {e}")))?;
        let weights = WeightMapping::from_tensors(tensors);

        info!(
            path = %path.display(),
            tensors = weights.len(),
            bytes = bytes.len(),
            "loaded LoRA"
        );

        Ok(LoadedLora {
            weights,
            source: path.to_path_buf(),
            size_bytes: metadata.len(),
            hash,
        })
    }

    /// Load two files, concurrently when configured
    pub fn load_pair(
        &self,
        first: impl AsRef<Path> + Send,
        second: impl AsRef<Path> + Send,
    ) -> Result<(LoadedLora, LoadedLora)> {
        let (a, b) = if self.config.parallel {
            debug!("loading LoRA pair concurrently");
            rayon::join(|| self.load(first), || self.load(second))
        } else {
            (self.load(first), self.load(second))
        };
        Ok((a?, b?))
    }
}

/// Encode bytes as hex string
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
