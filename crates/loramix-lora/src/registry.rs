//! LoRA registry
//!
//! Resolves LoRA names against a list of search directories. Names are paths
//! relative to a search directory, using `/` as the separator
//! (e.g. `styles/ink.safetensors`).

use crate::error::{MergeError, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File extension of loadable LoRA files
pub const LORA_EXTENSION: &str = "safetensors";

/// A LoRA file found under a search path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Name relative to its search path
    pub name: String,
    /// Full path on disk
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
}

/// LoRA registry
#[derive(Debug, Clone)]
pub struct LoraRegistry {
    /// Search paths for LoRAs, in priority order
    search_paths: Vec<PathBuf>,
}

impl LoraRegistry {
    /// Create a registry with the default search paths
    pub fn new() -> Self {
        Self {
            search_paths: vec![
                PathBuf::from("loras"),
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("loramix")
                    .join("loras"),
            ],
        }
    }

    /// Create a registry with exactly the given search paths
    pub fn with_search_paths(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a search path with the highest priority
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.insert(0, path.into());
    }

    /// Get search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Scan search paths for LoRA files, sorted by name.
    ///
    /// When two search paths hold the same name, the earlier path wins.
    pub fn scan(&self) -> Vec<RegistryEntry> {
        let mut found: BTreeMap<String, RegistryEntry> = BTreeMap::new();

        for root in &self.search_paths {
            let files = collect_files(root);
            debug!(path = %root.display(), files = files.len(), "scanned search path");

            for path in files {
                let Some(name) = relative_name(root, &path) else {
                    continue;
                };
                let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                found.entry(name.clone()).or_insert(RegistryEntry {
                    name,
                    path,
                    size_bytes,
                });
            }
        }

        found.into_values().collect()
    }

    /// Names of every LoRA found
    pub fn names(&self) -> Vec<String> {
        self.scan().into_iter().map(|e| e.name).collect()
    }

    /// Check if a name resolves
    pub fn contains_name(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Resolve a name to a full path
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));

        if !escapes && !name.is_empty() {
            for root in &self.search_paths {
                let candidate = root.join(relative);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        Err(MergeError::LoraNotFound {
            name: name.to_string(),
            searched: self.search_paths.clone(),
        })
    }
}

impl Default for LoraRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == LORA_EXTENSION))
        .collect()
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"stub").unwrap();
    }

    #[test]
    fn test_scan_nested_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("zeta.safetensors"));
        touch(&root.join("styles").join("ink.safetensors"));
        touch(&root.join("notes.txt"));

        let registry = LoraRegistry::with_search_paths([root]);

        assert_eq!(
            registry.names(),
            vec!["styles/ink.safetensors".to_string(), "zeta.safetensors".to_string()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_directory_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("ink.safetensors"));
        std::os::unix::fs::symlink(root, root.join("self")).unwrap();

        let registry = LoraRegistry::with_search_paths([root]);

        assert_eq!(registry.names(), vec!["ink.safetensors".to_string()]);
    }

    #[test]
    fn test_resolve_priority() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(&first.path().join("shared.safetensors"));
        touch(&second.path().join("shared.safetensors"));
        touch(&second.path().join("only.safetensors"));

        let registry = LoraRegistry::with_search_paths([first.path(), second.path()]);

        assert_eq!(
            registry.resolve("shared.safetensors").unwrap(),
            first.path().join("shared.safetensors")
        );
        assert_eq!(
            registry.resolve("only.safetensors").unwrap(),
            second.path().join("only.safetensors")
        );
        assert_eq!(registry.scan().len(), 2);
    }

    #[test]
    fn test_resolve_missing() {
        let temp_dir = TempDir::new().unwrap();
        let registry = LoraRegistry::with_search_paths([temp_dir.path()]);

        match registry.resolve("ghost.safetensors") {
            Err(MergeError::LoraNotFound { name, searched }) => {
                assert_eq!(name, "ghost.safetensors");
                assert_eq!(searched.len(), 1);
            }
            other => panic!("expected LoraNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_rejects_parent_components() {
        let temp_dir = TempDir::new().unwrap();
        let inner = temp_dir.path().join("loras");
        touch(&temp_dir.path().join("outside.safetensors"));
        std::fs::create_dir_all(&inner).unwrap();

        let registry = LoraRegistry::with_search_paths([&inner]);

        assert!(!registry.contains_name("../outside.safetensors"));
    }

    #[test]
    fn test_add_search_path_takes_priority() {
        let mut registry = LoraRegistry::new();
        registry.add_search_path("/custom");
        assert_eq!(registry.search_paths()[0], PathBuf::from("/custom"));
        assert_eq!(registry.search_paths().len(), 3);
    }
}
