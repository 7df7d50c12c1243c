//! Merge command

use super::resolve_lora;
use loramix_lora::{LoraLoader, LoraRegistry, MergeOptions, Merger, Strength};
use std::path::Path;
use tracing::info;

pub fn run(
    registry: &LoraRegistry,
    first: (&str, f64),
    second: (&str, f64),
    options: MergeOptions,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let path1 = resolve_lora(registry, first.0)?;
    let path2 = resolve_lora(registry, second.0)?;

    let loader = LoraLoader::default();
    let (lora1, lora2) = loader.load_pair(&path1, &path2)?;

    let method = options.method;
    let merged = Merger::new(options).merge(
        &lora1.weights,
        Strength::unchecked(first.1),
        &lora2.weights,
        Strength::unchecked(second.1),
    )?;

    merged.save(output)?;
    info!(output = %output.display(), "merge written");

    println!("Merged LoRA");
    println!("===========");
    println!("  {} x {}", lora1.file_name(), first.1);
    println!("  {} x {}", lora2.file_name(), second.1);
    println!();
    println!("Method:     {} ({})", method, method.description());
    println!("Best for:   {}", method.best_for());
    println!("Tensors:    {}", merged.len());
    println!("Parameters: {}", merged.parameter_count());
    println!("Output:     {}", output.display());

    Ok(())
}
