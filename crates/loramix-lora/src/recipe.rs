//! Merge recipes
//!
//! A recipe describes an N-way merge in JSON:
//!
//! ```json
//! {
//!   "method": "linear",
//!   "entries": [
//!     { "name": "styles/ink.safetensors", "strength": 0.6 },
//!     { "path": "/models/loras/detail.safetensors", "strength": 0.65 }
//!   ],
//!   "output": "merged.safetensors"
//! }
//! ```

use crate::error::{MergeError, Result};
use crate::loader::LoraLoader;
use crate::merge::{MergeOptions, Merger};
use crate::registry::LoraRegistry;
use crate::strength::Strength;
use crate::weights::WeightMapping;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// One input of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeEntry {
    /// Explicit file path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Registry name, used when `path` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Strength applied to this input
    #[serde(default)]
    pub strength: Strength,
}

impl RecipeEntry {
    /// Entry for an explicit path
    pub fn path(path: impl Into<PathBuf>, strength: f64) -> Self {
        Self {
            path: Some(path.into()),
            name: None,
            strength: Strength::unchecked(strength),
        }
    }

    /// Entry for a registry name
    pub fn named(name: impl Into<String>, strength: f64) -> Self {
        Self {
            path: None,
            name: Some(name.into()),
            strength: Strength::unchecked(strength),
        }
    }

    /// Locate the file this entry refers to
    pub fn resolve(&self, registry: &LoraRegistry) -> Result<PathBuf> {
        match (&self.path, &self.name) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(name)) => registry.resolve(name),
            (None, None) => Err(MergeError::Recipe(
                "entry needs either 'path' or 'name'".to_string(),
            )),
        }
    }
}

/// N-way merge description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecipe {
    /// Inputs in merge order
    pub entries: Vec<RecipeEntry>,
    /// Where to write the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Merge options
    #[serde(flatten)]
    pub options: MergeOptions,
}

impl MergeRecipe {
    /// Parse a recipe from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let recipe: Self =
            serde_json::from_str(text).map_err(|e| MergeError::Recipe(e.to_string()))?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Load a recipe file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| MergeError::FileLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    /// Check the recipe is runnable
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(MergeError::Recipe("recipe has no entries".to_string()));
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.path.is_none() && entry.name.is_none() {
                return Err(MergeError::Recipe(format!(
                    "entry {i} needs either 'path' or 'name'"
                )));
            }
        }
        Ok(())
    }

    /// Load every input, merge, and write the output if one is set
    pub fn run(&self, loader: &LoraLoader, registry: &LoraRegistry) -> Result<WeightMapping> {
        self.validate()?;

        let mut loaded = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let path = entry.resolve(registry)?;
            loaded.push((loader.load(&path)?, entry.strength));
        }

        let inputs: Vec<(&WeightMapping, Strength)> =
            loaded.iter().map(|(l, s)| (&l.weights, *s)).collect();
        let merged = Merger::new(self.options.clone()).merge_many(&inputs)?;

        if let Some(output) = &self.output {
            merged.save(output)?;
            info!(output = %output.display(), "recipe output written");
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MergeMethod;
    use candle_core::{Device, Tensor};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: f32) -> PathBuf {
        let mut w = WeightMapping::new();
        w.insert("k.weight", Tensor::new(&[value], &Device::Cpu).unwrap());
        let path = dir.join(name);
        w.save(&path).unwrap();
        path
    }

    #[test]
    fn test_parse_recipe() {
        let recipe = MergeRecipe::from_json(
            r#"{
                "method": "weighted_average",
                "check_compatibility": true,
                "entries": [
                    { "name": "a.safetensors", "strength": 0.6 },
                    { "path": "/tmp/b.safetensors" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(recipe.options.method, MergeMethod::WeightedAverage);
        assert!(recipe.options.check_compatibility);
        assert!(recipe.options.concat_fallback);
        assert_eq!(recipe.entries[1].strength.value(), 1.0);
        assert!(recipe.output.is_none());
    }

    #[test]
    fn test_invalid_recipes() {
        assert!(matches!(
            MergeRecipe::from_json(r#"{ "entries": [] }"#),
            Err(MergeError::Recipe(_))
        ));
        assert!(matches!(
            MergeRecipe::from_json(r#"{ "entries": [ { "strength": 1.0 } ] }"#),
            Err(MergeError::Recipe(_))
        ));
        assert!(matches!(
            MergeRecipe::from_json("not json"),
            Err(MergeError::Recipe(_))
        ));
    }

    #[test]
    fn test_run_recipe() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let first = write(dir, "first.safetensors", 1.0);
        write(dir, "second.safetensors", 2.0);
        write(dir, "third.safetensors", 4.0);
        let output = dir.join("out").join("merged.safetensors");

        let recipe = MergeRecipe {
            entries: vec![
                RecipeEntry::path(&first, 0.5),
                RecipeEntry::named("second.safetensors", 0.25),
                RecipeEntry::named("third.safetensors", 1.0),
            ],
            output: Some(output.clone()),
            options: MergeOptions::default(),
        };

        let registry = LoraRegistry::with_search_paths([dir]);
        let merged = recipe.run(&LoraLoader::default(), &registry).unwrap();

        assert_eq!(
            merged.get("k.weight").unwrap().to_vec1::<f32>().unwrap(),
            vec![5.0]
        );
        assert!(output.is_file());
    }

    #[test]
    fn test_run_recipe_missing_name() {
        let temp_dir = TempDir::new().unwrap();
        let recipe = MergeRecipe {
            entries: vec![RecipeEntry::named("missing.safetensors", 1.0)],
            output: None,
            options: MergeOptions::default(),
        };

        let registry = LoraRegistry::with_search_paths([temp_dir.path()]);
        let result = recipe.run(&LoraLoader::default(), &registry);

        assert!(matches!(result, Err(MergeError::LoraNotFound { .. })));
    }
}
