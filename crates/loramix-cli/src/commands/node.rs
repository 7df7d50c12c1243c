//! Node declaration command

use loramix_lora::{LoraLoader, LoraRegistry};
use loramix_node::{node_class_mappings, node_display_name_mappings, NodeContext};

pub fn run(registry: LoraRegistry, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let context = NodeContext {
        registry,
        loader: LoraLoader::default(),
    };
    let names = node_display_name_mappings();

    let schemas: Vec<_> = node_class_mappings()
        .values()
        .map(|factory| factory(&context).schema())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }

    for schema in &schemas {
        println!(
            "{} ({})",
            names.get(schema.class_type).unwrap_or(&schema.display_name),
            schema.class_type
        );
        println!("  Category: {}", schema.category);
        println!("  {}", schema.description);
        println!();
        println!("  Inputs:");
        for input in &schema.required {
            println!("    - {} (required) {}", input.name, input.tooltip);
        }
        for input in &schema.optional {
            println!("    - {} (optional) {}", input.name, input.tooltip);
        }
        println!("  Returns: {}", schema.return_types.join(", "));
    }

    Ok(())
}
