//! LoRA listing command

use loramix_lora::LoraRegistry;

pub fn run(registry: &LoraRegistry) {
    println!("LoRA Search Paths:");
    for path in registry.search_paths() {
        println!("  - {}", path.display());
    }

    println!();

    let found = registry.scan();
    if found.is_empty() {
        println!("No LoRAs found.");
        return;
    }

    println!("Found {} LoRA(s):", found.len());
    for entry in found {
        println!(
            "  - {} ({:.1} MB)",
            entry.name,
            entry.size_bytes as f64 / (1024.0 * 1024.0)
        );
    }
}
