//! Host node abstraction

use crate::error::Result;
use crate::schema::{NodeSchema, LORA_MODEL};
use loramix_lora::{LoraLoader, LoraRegistry, MergeMethod, WeightMapping};

/// A node the host graph can evaluate
pub trait Node: Send + Sync {
    /// Class identifier registered with the host
    fn class_type(&self) -> &'static str;

    /// Name shown in the host UI
    fn display_name(&self) -> &'static str;

    /// Menu category
    fn category(&self) -> &'static str;

    /// Help text
    fn description(&self) -> &'static str;

    /// Declared inputs and outputs
    fn schema(&self) -> NodeSchema;

    /// Evaluate the node once with host-supplied inputs
    fn execute(&self, inputs: &serde_json::Value) -> Result<Vec<NodeValue>>;
}

/// Shared services handed to node constructors
#[derive(Debug, Clone, Default)]
pub struct NodeContext {
    /// Resolves LoRA names to files
    pub registry: LoraRegistry,
    /// Loads LoRA files
    pub loader: LoraLoader,
}

/// A value produced by a node
#[derive(Debug, Clone)]
pub enum NodeValue {
    /// Merged LoRA weights
    LoraModel(LoraModel),
}

impl NodeValue {
    /// Host type tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::LoraModel(_) => LORA_MODEL,
        }
    }

    /// Take the LoRA model out, if this is one
    pub fn into_lora_model(self) -> Option<LoraModel> {
        match self {
            Self::LoraModel(model) => Some(model),
        }
    }
}

/// Merged weights handed to downstream nodes
#[derive(Debug, Clone)]
pub struct LoraModel {
    /// The merged weight mapping
    pub weights: WeightMapping,
    /// Names of the LoRAs it was built from
    pub sources: Vec<String>,
    /// Method used to build it
    pub method: MergeMethod,
}
