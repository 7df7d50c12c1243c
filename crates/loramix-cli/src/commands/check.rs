//! Compatibility check command

use super::resolve_lora;
use loramix_lora::{LoraLoader, LoraRegistry, LoraValidator};

pub fn run(
    registry: &LoraRegistry,
    lora1: &str,
    lora2: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path1 = resolve_lora(registry, lora1)?;
    let path2 = resolve_lora(registry, lora2)?;
    let (first, second) = LoraLoader::default().load_pair(&path1, &path2)?;

    let report = LoraValidator::new().check(&first.weights, &second.weights);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Checking {} against {}", first.file_name(), second.file_name());
    println!();
    println!("Types:        {} / {}", report.lora1_format, report.lora2_format);
    println!("Total keys:   {} / {}", report.total_keys1, report.total_keys2);
    println!("Common keys:  {}", report.common_keys);
    println!("Unique keys:  {} / {}", report.unique_keys1, report.unique_keys2);
    println!();

    if report.is_compatible {
        println!("✓ LoRAs are compatible");
    } else {
        println!("✗ LoRAs are not compatible");
        println!();
        println!("Issues:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }

    if report.has_warnings() {
        println!();
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }

    Ok(())
}
