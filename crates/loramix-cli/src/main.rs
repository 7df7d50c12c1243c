//! LoraMix CLI - LoRA merging frontend
//!
//! A tool for combining, inspecting and checking LoRA weight files.

use clap::{Parser, Subcommand};
use loramix_lora::LoraRegistry;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// LoraMix - combine LoRA weight files
#[derive(Parser)]
#[command(name = "loramix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Extra directory to search for LoRAs (repeatable)
    #[arg(long = "lora-dir", global = true)]
    lora_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge two LoRAs into one file
    Merge {
        /// First LoRA (path or registry name)
        lora1: String,

        /// Second LoRA (path or registry name)
        lora2: String,

        /// Strength of the first LoRA
        #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
        strength1: f64,

        /// Strength of the second LoRA
        #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
        strength2: f64,

        /// Merge method
        #[arg(short, long, value_enum, default_value = "linear")]
        method: MethodArg,

        /// Fail on shape mismatches instead of zero-padding
        #[arg(long)]
        check: bool,

        /// With --check, also fail on dtype mismatches
        #[arg(long, requires = "check")]
        check_dtype: bool,

        /// Accept strengths outside [-100, 100]
        #[arg(long)]
        no_strength_limit: bool,

        /// Weighted average behavior when all strengths are zero
        #[arg(long, value_enum, default_value = "zeros")]
        zero_sum: ZeroSumArg,

        /// Fail instead of merging ineligible factor pairs linearly
        #[arg(long)]
        strict_concat: bool,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Report whether two LoRAs can be merged cleanly
    Check {
        /// First LoRA (path or registry name)
        lora1: String,

        /// Second LoRA (path or registry name)
        lora2: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show details of a LoRA file
    Info {
        /// LoRA (path or registry name)
        lora: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available LoRAs
    List,

    /// Run an N-way merge recipe
    Recipe {
        /// Recipe file (JSON)
        file: PathBuf,

        /// Override the recipe's output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the host node declaration
    Node {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum MethodArg {
    /// Strength-weighted sum
    Linear,
    /// Sum with strengths normalized to unit magnitude
    WeightedAverage,
    /// Stack low-rank factors
    Concatenation,
}

impl From<MethodArg> for loramix_lora::MergeMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Linear => Self::Linear,
            MethodArg::WeightedAverage => Self::WeightedAverage,
            MethodArg::Concatenation => Self::Concatenation,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ZeroSumArg {
    /// All-zero output tensors
    Zeros,
    /// Equal weights
    Uniform,
}

impl From<ZeroSumArg> for loramix_lora::ZeroSumPolicy {
    fn from(arg: ZeroSumArg) -> Self {
        match arg {
            ZeroSumArg::Zeros => Self::Zeros,
            ZeroSumArg::Uniform => Self::Uniform,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut registry = LoraRegistry::new();
    for dir in cli.lora_dirs.iter().rev() {
        registry.add_search_path(dir.clone());
    }

    match cli.command {
        Commands::Merge {
            lora1,
            lora2,
            strength1,
            strength2,
            method,
            check,
            check_dtype,
            no_strength_limit,
            zero_sum,
            strict_concat,
            output,
        } => {
            let options = loramix_lora::MergeOptions {
                method: method.into(),
                check_compatibility: check,
                check_dtype,
                enforce_strength_range: !no_strength_limit,
                zero_sum: zero_sum.into(),
                concat_fallback: !strict_concat,
            };
            commands::merge::run(
                &registry,
                (lora1.as_str(), strength1),
                (lora2.as_str(), strength2),
                options,
                &output,
            )?;
        }

        Commands::Check { lora1, lora2, json } => {
            commands::check::run(&registry, &lora1, &lora2, json)?;
        }

        Commands::Info { lora, json } => {
            commands::info::run(&registry, &lora, json)?;
        }

        Commands::List => commands::list::run(&registry),

        Commands::Recipe { file, output } => {
            commands::recipe::run(&registry, &file, output)?;
        }

        Commands::Node { json } => commands::node::run(registry, json)?,
    }

    Ok(())
}
