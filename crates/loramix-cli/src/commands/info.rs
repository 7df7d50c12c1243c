//! LoRA info command

use super::resolve_lora;
use loramix_lora::{LoraLoader, LoraRegistry};

pub fn run(
    registry: &LoraRegistry,
    lora: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_lora(registry, lora)?;
    let info = LoraLoader::default().load(&path)?.info();

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("LoRA: {}", info.name);
    println!("==============================");
    println!("Path:       {}", path.display());
    println!("Type:       {}", info.format);
    println!("Tensors:    {}", info.num_keys);
    println!("Parameters: {}", info.num_parameters);
    println!("Size:       {} bytes", info.size_bytes);
    println!("Hash:       {}", info.hash);
    println!();
    println!("Sample keys:");
    for key in &info.sample_keys {
        match info.sample_shapes.get(key) {
            Some(shape) => println!("  - {} {:?}", key, shape),
            None => println!("  - {}", key),
        }
    }

    Ok(())
}
