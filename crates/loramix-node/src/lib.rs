//! LoraMix Node - Host plugin boundary
//!
//! Exposes the LoRA merger as a node of a node-based image generation host.
//!
//! # Architecture
//!
//! ```text
//! Host graph                           LoraMix
//! ┌─────────────┐                     ┌─────────────┐
//! │             │   NodeSchema        │             │
//! │  builds     │ ◄────────────────── │  declares   │
//! │  palette    │                     │  inputs     │
//! │             │   inputs (JSON)     │             │
//! │  evaluates  │ ──────────────────► │  loads      │
//! │  graph      │                     │  merges     │
//! │             │   LORA_MODEL        │             │
//! │             │ ◄────────────────── │  returns    │
//! └─────────────┘                     └─────────────┘
//! ```

pub mod combine;
pub mod error;
pub mod node;
pub mod schema;

pub use combine::{CombineLoras, CombineLorasInputs};
pub use error::{NodeError, Result};
pub use node::{LoraModel, Node, NodeContext, NodeValue};
pub use schema::{InputKind, InputSpec, NodeSchema, LORA_MODEL};

use std::collections::BTreeMap;

/// Constructor for a node class
pub type NodeFactory = fn(&NodeContext) -> Box<dyn Node>;

/// Node class identifiers mapped to their constructors
pub fn node_class_mappings() -> BTreeMap<&'static str, NodeFactory> {
    let mut mappings: BTreeMap<&'static str, NodeFactory> = BTreeMap::new();
    mappings.insert(CombineLoras::CLASS_TYPE, |ctx| {
        Box::new(CombineLoras::from_context(ctx))
    });
    mappings
}

/// Node class identifiers mapped to their display names
pub fn node_display_name_mappings() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([(CombineLoras::CLASS_TYPE, CombineLoras::DISPLAY_NAME)])
}

/// Instantiate a node by class identifier
pub fn create_node(class_type: &str, context: &NodeContext) -> Result<Box<dyn Node>> {
    node_class_mappings()
        .get(class_type)
        .map(|factory| factory(context))
        .ok_or_else(|| NodeError::UnknownNode(class_type.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mappings_agree() {
        let classes = node_class_mappings();
        let names = node_display_name_mappings();

        assert_eq!(
            classes.keys().collect::<Vec<_>>(),
            names.keys().collect::<Vec<_>>()
        );
        assert_eq!(names["CombineLoras"], "Combine LoRAs");
    }

    #[test]
    fn test_create_node() {
        let context = NodeContext::default();

        let node = create_node("CombineLoras", &context).unwrap();
        assert_eq!(node.display_name(), "Combine LoRAs");
        assert_eq!(node.schema().return_types, vec![LORA_MODEL]);

        assert!(matches!(
            create_node("SaveLora", &context),
            Err(NodeError::UnknownNode(_))
        ));
    }
}
