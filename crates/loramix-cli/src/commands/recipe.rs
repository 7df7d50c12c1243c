//! Recipe command

use loramix_lora::{LoraLoader, LoraRegistry, MergeRecipe};
use std::path::{Path, PathBuf};

pub fn run(
    registry: &LoraRegistry,
    file: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut recipe = MergeRecipe::load(file)?;
    if output.is_some() {
        recipe.output = output;
    }

    println!(
        "Running recipe with {} LoRA(s), method {}",
        recipe.entries.len(),
        recipe.options.method
    );
    for entry in &recipe.entries {
        let label = match (&entry.path, &entry.name) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => "<unnamed>".to_string(),
        };
        println!("  - {} x {}", label, entry.strength);
    }

    let merged = recipe.run(&LoraLoader::default(), registry)?;

    println!();
    println!("Tensors: {}", merged.len());
    match &recipe.output {
        Some(path) => println!("Output:  {}", path.display()),
        None => println!("No output path set; result discarded."),
    }

    Ok(())
}
