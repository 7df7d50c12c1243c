//! Subcommand implementations

pub mod check;
pub mod info;
pub mod list;
pub mod merge;
pub mod node;
pub mod recipe;

use loramix_lora::LoraRegistry;
use std::path::{Path, PathBuf};

/// Treat an argument as a file path if it exists, otherwise as a registry name
pub fn resolve_lora(registry: &LoraRegistry, arg: &str) -> loramix_lora::Result<PathBuf> {
    let path = Path::new(arg);
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        registry.resolve(arg)
    }
}
