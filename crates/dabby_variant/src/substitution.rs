//! Rewrites a score's pitches from a chaotic mapping.
//!
//! The i-th sounding event (note or chord, rests skipped) of every part reads
//! mapping pair i. Its target index selects a pitch from the part's own pool of
//! roots, wrapped by the pool size. Notes take the pool pitch; chords are
//! transposed so their root lands on it. Self-mapped pairs leave the event alone.
//! Chord tones pushed past either end of the MIDI range are folded back by
//! octaves, so a substitution never fails on range.

use crate::pitch::Pitch;
use crate::score::{chord_root, EventKind, Part, Score};
use anyhow::Result;
use dabby_core::{ChaoticMapping, ChaosError};
use serde::Serialize;
use tracing::{debug, warn};

/// Candidate pitches, one per sounding event, indexed modulo `size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitchPool {
    roots: Vec<Pitch>,
    size: usize,
}

impl PitchPool {
    /// `number_of_pitches == 0` uses every root; larger values are clamped to the
    /// number of roots available.
    pub fn new(roots: Vec<Pitch>, number_of_pitches: usize) -> Self {
        let natural = roots.len();
        let size = if number_of_pitches == 0 {
            natural
        } else {
            if number_of_pitches > natural {
                warn!(
                    requested = number_of_pitches,
                    available = natural,
                    "pitch pool smaller than requested, clamping"
                );
            }
            number_of_pitches.min(natural)
        };
        Self { roots, size }
    }

    pub fn from_part(part: &Part, number_of_pitches: usize) -> Self {
        Self::new(part.roots(), number_of_pitches)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn roots(&self) -> &[Pitch] {
        &self.roots
    }

    pub fn lookup(&self, target_index: usize) -> Result<Pitch, ChaosError> {
        if self.size == 0 {
            return Err(ChaosError::InvalidInput(format!(
                "Cannot look up index {target_index} in an empty pitch pool."
            )));
        }
        Ok(self.roots[target_index % self.size])
    }
}

/// What happened to one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstitutionReport {
    pub part: String,
    pub events: usize,
    pub substituted: usize,
    pub unmapped: usize,
    /// Chord tones moved by an octave to stay in the MIDI range.
    pub folded: usize,
    pub pool_size: usize,
}

/// Applies `mapping` positionally to the sounding events of `part`.
///
/// Out-of-range chord tones are folded by octaves and counted in
/// [`SubstitutionReport::folded`]. Tones that fold onto each other collapse.
pub fn overwrite_part(
    part: &mut Part,
    mapping: &ChaoticMapping,
    number_of_pitches: usize,
) -> Result<SubstitutionReport> {
    let pool = PitchPool::from_part(part, number_of_pitches);
    let mut report = SubstitutionReport {
        part: part.label(),
        events: 0,
        substituted: 0,
        unmapped: 0,
        folded: 0,
        pool_size: pool.size(),
    };

    for (position, event) in part.sounding_events_mut().enumerate() {
        report.events += 1;
        let Some(pair) = mapping.get(position) else {
            report.unmapped += 1;
            continue;
        };
        if pair.is_self_mapping() {
            continue;
        }

        let new_pitch = pool.lookup(pair.target_index)?;
        event.kind = match &event.kind {
            EventKind::Note { .. } => EventKind::Note { pitch: new_pitch },
            EventKind::Chord { pitches } => {
                let root = chord_root(pitches).unwrap_or(new_pitch);
                let shift = root.interval_to(new_pitch);
                let mut moved: Vec<Pitch> = Vec::with_capacity(pitches.len());
                for &tone in pitches {
                    if tone.transpose(shift).is_err() {
                        report.folded += 1;
                    }
                    moved.push(tone.transpose_folded(shift));
                }
                moved.sort();
                moved.dedup();
                if moved.len() == 1 {
                    EventKind::Note { pitch: moved[0] }
                } else {
                    EventKind::Chord { pitches: moved }
                }
            }
            EventKind::Rest => continue,
        };
        report.substituted += 1;
    }

    if report.unmapped > 0 {
        warn!(
            part = %report.part,
            unmapped = report.unmapped,
            mapping_len = mapping.len(),
            "mapping shorter than the part, trailing events left unchanged"
        );
    }
    debug!(
        part = %report.part,
        events = report.events,
        substituted = report.substituted,
        folded = report.folded,
        pool_size = report.pool_size,
        "overwrote part"
    );
    Ok(report)
}

/// Applies the same mapping to every part of the score.
pub fn overwrite_score(
    score: &mut Score,
    mapping: &ChaoticMapping,
    number_of_pitches: usize,
) -> Result<Vec<SubstitutionReport>> {
    score
        .parts
        .iter_mut()
        .map(|part| overwrite_part(part, mapping, number_of_pitches))
        .collect()
}
