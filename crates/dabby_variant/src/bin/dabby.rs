use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dabby_core::compute_chaotic_mapping_with;
use dabby_variant::config::VariantConfig;
use dabby_variant::write_variant_file;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dabby")]
#[command(version)]
#[command(about = "Chaotic pitch variants of MIDI scores from a pair of Lorenz trajectories")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a variant of a MIDI file.
    Variant {
        /// MIDI file (.mid) to use as input.
        input: PathBuf,
        /// JSON file with the Lorenz parameter pair.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Pitch pool size; 0 uses every root of each part.
        #[arg(long)]
        number_of_pitches: Option<usize>,
        /// Directory for the variant. Defaults to the input's directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Timestamp embedded in the output name. Defaults to local time as MMDDYYYYHHMMSS.
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Print the chaotic index mapping as JSON.
    Map {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MappingDump<'a> {
    len: usize,
    variations: usize,
    variation_ratio: f64,
    distinct_targets: usize,
    pairs: &'a dabby_core::ChaoticMapping,
}

fn load_config(path: Option<&PathBuf>) -> Result<VariantConfig> {
    match path {
        Some(path) => VariantConfig::load(path),
        None => Ok(VariantConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Variant {
            input,
            config,
            number_of_pitches,
            output_dir,
            timestamp,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(n) = number_of_pitches {
                config.number_of_pitches = n;
            }
            let timestamp = timestamp
                .unwrap_or_else(|| chrono::Local::now().format("%m%d%Y%H%M%S").to_string());
            let path = write_variant_file(&input, output_dir.as_deref(), &timestamp, &config)?;
            println!("wrote variant {}", path.display());
        }
        Command::Map { config, output } => {
            let config = load_config(config.as_ref())?;
            let mapping =
                compute_chaotic_mapping_with(&config.run_a(), &config.run_b(), &config.solver)?;
            let dump = MappingDump {
                len: mapping.len(),
                variations: mapping.variation_count(),
                variation_ratio: mapping.variation_ratio(),
                distinct_targets: mapping.distinct_targets(),
                pairs: &mapping,
            };
            let json = serde_json::to_string_pretty(&dump)?;
            match output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}
