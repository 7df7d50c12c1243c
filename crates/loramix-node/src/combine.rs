//! The Combine LoRAs node

use crate::error::{NodeError, Result};
use crate::node::{LoraModel, Node, NodeContext, NodeValue};
use crate::schema::{InputSpec, NodeSchema, LORA_MODEL};
use loramix_lora::{
    LoraLoader, LoraRegistry, MergeMethod, MergeOptions, Merger, Strength,
};
use serde::Deserialize;
use tracing::{info, warn};

/// Values the host passes to [`CombineLoras`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CombineLorasInputs {
    /// First LoRA name
    pub lora_name1: String,
    /// Strength of the first LoRA
    #[serde(default = "default_strength")]
    pub strength1: f64,
    /// Second LoRA name
    pub lora_name2: String,
    /// Strength of the second LoRA
    #[serde(default = "default_strength")]
    pub strength2: f64,
    /// Combination method
    #[serde(default)]
    pub merge_method: MergeMethod,
    /// Fail on shape mismatches instead of padding
    #[serde(default)]
    pub check_compatibility: bool,
}

fn default_strength() -> f64 {
    Strength::DEFAULT
}

/// Combine two LoRAs by merging their weights based on the given strengths
#[derive(Debug, Clone, Default)]
pub struct CombineLoras {
    registry: LoraRegistry,
    loader: LoraLoader,
}

impl CombineLoras {
    /// Class identifier
    pub const CLASS_TYPE: &'static str = "CombineLoras";
    /// Display name
    pub const DISPLAY_NAME: &'static str = "Combine LoRAs";

    /// Create the node
    pub fn new(registry: LoraRegistry, loader: LoraLoader) -> Self {
        Self { registry, loader }
    }

    /// Create the node from shared services
    pub fn from_context(context: &NodeContext) -> Self {
        Self::new(context.registry.clone(), context.loader.clone())
    }

    /// Load both LoRAs and merge them
    pub fn combine(&self, inputs: &CombineLorasInputs) -> Result<LoraModel> {
        let strength1 = Strength::new(inputs.strength1)?;
        let strength2 = Strength::new(inputs.strength2)?;

        let path1 = self.registry.resolve(&inputs.lora_name1)?;
        let path2 = self.registry.resolve(&inputs.lora_name2)?;
        let (lora1, lora2) = self.loader.load_pair(&path1, &path2)?;

        if lora1.hash == lora2.hash {
            warn!(
                lora1 = %inputs.lora_name1,
                lora2 = %inputs.lora_name2,
                "both inputs have identical contents"
            );
        }

        let merger = Merger::new(MergeOptions {
            method: inputs.merge_method,
            check_compatibility: inputs.check_compatibility,
            ..Default::default()
        });
        let weights = merger.merge(&lora1.weights, strength1, &lora2.weights, strength2)?;

        info!(
            lora1 = %inputs.lora_name1,
            lora2 = %inputs.lora_name2,
            %strength1,
            %strength2,
            tensors = weights.len(),
            "combined LoRAs"
        );

        Ok(LoraModel {
            weights,
            sources: vec![inputs.lora_name1.clone(), inputs.lora_name2.clone()],
            method: inputs.merge_method,
        })
    }
}

impl Node for CombineLoras {
    fn class_type(&self) -> &'static str {
        Self::CLASS_TYPE
    }

    fn display_name(&self) -> &'static str {
        Self::DISPLAY_NAME
    }

    fn category(&self) -> &'static str {
        "loaders"
    }

    fn description(&self) -> &'static str {
        "Combine two LoRAs by merging their weights based on the given strengths."
    }

    fn schema(&self) -> NodeSchema {
        let names = self.registry.names();
        let methods = MergeMethod::ALL.iter().map(|m| m.to_string()).collect();

        NodeSchema {
            class_type: self.class_type(),
            display_name: self.display_name(),
            category: self.category(),
            description: self.description(),
            required: vec![
                InputSpec::choice("lora_name1", names.clone(), None)
                    .with_tooltip("The name of the first LoRA."),
                strength_input("strength1").with_tooltip("Strength for the first LoRA."),
                InputSpec::choice("lora_name2", names, None)
                    .with_tooltip("The name of the second LoRA."),
                strength_input("strength2").with_tooltip("Strength for the second LoRA."),
            ],
            optional: vec![
                InputSpec::choice(
                    "merge_method",
                    methods,
                    Some(MergeMethod::default().to_string()),
                )
                .with_tooltip("How the two LoRAs are combined."),
                InputSpec::boolean("check_compatibility", false)
                    .with_tooltip("Fail when shared tensors have different shapes."),
            ],
            return_types: vec![LORA_MODEL],
        }
    }

    fn execute(&self, inputs: &serde_json::Value) -> Result<Vec<NodeValue>> {
        let inputs: CombineLorasInputs = serde_json::from_value(inputs.clone())
            .map_err(|e| NodeError::InvalidInput(e.to_string()))?;
        Ok(vec![NodeValue::LoraModel(self.combine(&inputs)?)])
    }
}

fn strength_input(name: &'static str) -> InputSpec {
    InputSpec::float(
        name,
        Strength::DEFAULT,
        Strength::MIN,
        Strength::MAX,
        Strength::STEP,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::InputKind;
    use candle_core::{Device, Tensor};
    use loramix_lora::{MergeError, WeightMapping};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, entries: &[(&str, &[f32])]) {
        let weights: WeightMapping = entries
            .iter()
            .map(|(k, v)| (k.to_string(), Tensor::new(*v, &Device::Cpu).unwrap()))
            .collect();
        weights.save(dir.join(name)).unwrap();
    }

    fn node(dir: &Path) -> CombineLoras {
        CombineLoras::new(
            LoraRegistry::with_search_paths([dir]),
            LoraLoader::default(),
        )
    }

    #[test]
    fn test_execute_combines() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "one.safetensors", &[("a.weight", &[1.0, 2.0])]);
        write(
            temp_dir.path(),
            "two.safetensors",
            &[("a.weight", &[3.0, 4.0]), ("b.weight", &[5.0])],
        );

        let outputs = node(temp_dir.path())
            .execute(&json!({
                "lora_name1": "one.safetensors",
                "strength1": 2.0,
                "lora_name2": "two.safetensors",
                "strength2": 0.5
            }))
            .unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].type_name(), LORA_MODEL);

        let model = outputs.into_iter().next().unwrap().into_lora_model().unwrap();
        assert_eq!(model.method, MergeMethod::Linear);
        assert_eq!(
            model.weights.get("a.weight").unwrap().to_vec1::<f32>().unwrap(),
            vec![3.5, 5.0]
        );
        assert_eq!(
            model.weights.get("b.weight").unwrap().to_vec1::<f32>().unwrap(),
            vec![2.5]
        );
    }

    #[test]
    fn test_default_strengths() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "one.safetensors", &[("k", &[1.0])]);
        write(temp_dir.path(), "two.safetensors", &[("k", &[2.0])]);

        let inputs: CombineLorasInputs = serde_json::from_value(json!({
            "lora_name1": "one.safetensors",
            "lora_name2": "two.safetensors"
        }))
        .unwrap();
        assert_eq!(inputs.strength1, 1.0);
        assert!(!inputs.check_compatibility);

        let model = node(temp_dir.path()).combine(&inputs).unwrap();
        assert_eq!(
            model.weights.get("k").unwrap().to_vec1::<f32>().unwrap(),
            vec![3.0]
        );
    }

    #[test]
    fn test_check_compatibility_input() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "one.safetensors", &[("k", &[1.0, 2.0])]);
        write(temp_dir.path(), "two.safetensors", &[("k", &[1.0])]);

        let result = node(temp_dir.path()).execute(&json!({
            "lora_name1": "one.safetensors",
            "lora_name2": "two.safetensors",
            "check_compatibility": true
        }));

        assert!(matches!(
            result,
            Err(NodeError::Merge(MergeError::IncompatibleShape { .. }))
        ));
    }

    #[test]
    fn test_missing_lora_is_file_error() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "one.safetensors", &[("k", &[1.0])]);

        let result = node(temp_dir.path()).execute(&json!({
            "lora_name1": "one.safetensors",
            "lora_name2": "absent.safetensors"
        }));

        match result {
            Err(NodeError::Merge(e)) => assert!(e.is_file_error()),
            other => panic!("expected merge error, got {other:?}"),
        }
    }

    #[test]
    fn test_strength_out_of_range() {
        let temp_dir = TempDir::new().unwrap();

        let result = node(temp_dir.path()).execute(&json!({
            "lora_name1": "one.safetensors",
            "lora_name2": "two.safetensors",
            "strength1": 101.0
        }));

        assert!(matches!(
            result,
            Err(NodeError::Merge(MergeError::InvalidStrength { .. }))
        ));
    }

    #[test]
    fn test_bad_input_shape() {
        let temp_dir = TempDir::new().unwrap();
        let result = node(temp_dir.path()).execute(&json!({ "strength1": "high" }));
        assert!(matches!(result, Err(NodeError::InvalidInput(_))));

        let result = node(temp_dir.path()).execute(&json!({
            "lora_name1": "a",
            "lora_name2": "b",
            "merge_method": "slerp"
        }));
        assert!(matches!(result, Err(NodeError::InvalidInput(_))));
    }

    #[test]
    fn test_merge_method_aliases() {
        let inputs: CombineLorasInputs = serde_json::from_value(json!({
            "lora_name1": "one.safetensors",
            "lora_name2": "two.safetensors",
            "merge_method": "concat"
        }))
        .unwrap();

        assert_eq!(inputs.merge_method, MergeMethod::Concatenation);
    }

    #[test]
    fn test_schema() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "one.safetensors", &[("k", &[1.0])]);

        let schema = node(temp_dir.path()).schema();

        assert_eq!(schema.class_type, "CombineLoras");
        assert_eq!(schema.category, "loaders");
        assert_eq!(schema.return_types, vec![LORA_MODEL]);
        assert_eq!(schema.required.len(), 4);

        match &schema.input("lora_name1").unwrap().kind {
            InputKind::Choice { options, .. } => {
                assert_eq!(options, &vec!["one.safetensors".to_string()])
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(
            schema.input("strength2").unwrap().kind,
            InputKind::Float {
                default: 1.0,
                min: -100.0,
                max: 100.0,
                step: 0.01
            }
        );
        assert!(schema.input("merge_method").is_some());
    }
}
