//! LoraMix LoRA - LoRA loading and merging
//!
//! Loads LoRA (Low-Rank Adaptation) weight files and combines them into a
//! single weight mapping under independently adjustable strengths.
//!
//! # Merge Overview
//!
//! ```text
//! lora1.safetensors ─┐
//!                    ├─ load ─► Merger(method, strengths) ─► WeightMapping
//! lora2.safetensors ─┘
//! ```
//!
//! - The merged key set is the union of the input key sets
//! - Shared keys are combined by the selected [`MergeMethod`]
//! - Keys held by one input are scaled by that input's strength
//! - Inputs are never modified; the caller owns the result

mod concat;
pub mod error;
pub mod format;
pub mod loader;
pub mod merge;
pub mod method;
pub mod recipe;
pub mod registry;
pub mod strength;
pub mod validator;
pub mod weights;

pub use error::{MergeError, Result};
pub use format::{FactorFamily, FactorPattern, LoraFormat};
pub use loader::{LoadedLora, LoaderConfig, LoraInfo, LoraLoader};
pub use merge::{normalized_strengths, MergeOptions, Merger};
pub use method::{MergeMethod, ZeroSumPolicy};
pub use recipe::{MergeRecipe, RecipeEntry};
pub use registry::{LoraRegistry, RegistryEntry};
pub use strength::Strength;
pub use validator::{CompatibilityIssue, CompatibilityReport, CompatibilityWarning, LoraValidator};
pub use weights::{TensorSpec, WeightMapping};
