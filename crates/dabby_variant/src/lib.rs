//! Turns a MIDI score and two Lorenz parameter sets into a chaotic variant.
//!
//! The engine lives in `dabby_core`; this crate owns everything around it:
//! the score model, pitch substitution, MIDI input/output, file naming and
//! configuration.

pub mod config;
pub mod midi;
pub mod naming;
pub mod pitch;
pub mod score;
pub mod substitution;

use anyhow::Result;
use dabby_core::{compute_chaotic_mapping_with, ChaoticMapping};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::VariantConfig;
use crate::score::Score;
use crate::substitution::{overwrite_score, SubstitutionReport};

/// A finished variant together with the mapping that produced it.
pub struct Variant {
    pub score: Score,
    pub mapping: ChaoticMapping,
    pub reports: Vec<SubstitutionReport>,
}

/// Computes the mapping from `config` and rewrites `score` with it.
pub fn make_variant(mut score: Score, config: &VariantConfig) -> Result<Variant> {
    config.validate()?;
    let mapping = compute_chaotic_mapping_with(&config.run_a(), &config.run_b(), &config.solver)?;
    let reports = overwrite_score(&mut score, &mapping, config.number_of_pitches)?;
    Ok(Variant {
        score,
        mapping,
        reports,
    })
}

/// Reads `input`, writes its variant under `output_dir` (or beside the input) and
/// returns the path written.
pub fn write_variant_file(
    input: &Path,
    output_dir: Option<&Path>,
    timestamp: &str,
    config: &VariantConfig,
) -> Result<PathBuf> {
    let score = midi::read_score(input)?;
    let variant = make_variant(score, config)?;
    let path = naming::variant_path(input, output_dir, timestamp)?;
    midi::write_score(&variant.score, &path)?;

    let substituted: usize = variant.reports.iter().map(|r| r.substituted).sum();
    info!(
        path = %path.display(),
        substituted,
        variation_ratio = variant.mapping.variation_ratio(),
        "wrote variant"
    );
    Ok(path)
}
