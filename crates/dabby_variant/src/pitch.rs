use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A MIDI key number, 0..=127. Middle C (60) is "C4".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Pitch(u8);

impl Pitch {
    pub const MAX: u8 = 127;

    pub fn new(midi: u8) -> Result<Self> {
        if midi > Self::MAX {
            bail!("MIDI pitch {midi} is out of range 0..=127.");
        }
        Ok(Self(midi))
    }

    pub fn midi(self) -> u8 {
        self.0
    }

    pub fn pitch_class(self) -> u8 {
        self.0 % 12
    }

    pub fn octave(self) -> i8 {
        (self.0 / 12) as i8 - 1
    }

    pub fn name_with_octave(self) -> String {
        format!("{}{}", NAMES[self.pitch_class() as usize], self.octave())
    }

    /// Moves the pitch by `semitones`; leaving the MIDI range is an error.
    pub fn transpose(self, semitones: i16) -> Result<Self> {
        let target = i16::from(self.0) + semitones;
        if !(0..=i16::from(Self::MAX)).contains(&target) {
            bail!(
                "Transposing {} by {semitones} semitones leaves the MIDI range.",
                self.name_with_octave()
            );
        }
        Ok(Self(target as u8))
    }

    /// Moves the pitch by `semitones`, then by whole octaves back into the MIDI
    /// range if needed. The pitch class is always that of the plain transposition.
    pub fn transpose_folded(self, semitones: i16) -> Self {
        let max = i16::from(Self::MAX);
        let mut target = i16::from(self.0) + semitones;
        if target > max {
            target -= 12 * ((target - max + 11) / 12);
        } else if target < 0 {
            target += 12 * ((-target + 11) / 12);
        }
        Self(target as u8)
    }

    /// Signed distance in semitones from `self` up to `other`.
    pub fn interval_to(self, other: Pitch) -> i16 {
        i16::from(other.0) - i16::from(self.0)
    }
}

impl TryFrom<u8> for Pitch {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        Pitch::new(value)
    }
}

impl From<Pitch> for u8 {
    fn from(pitch: Pitch) -> Self {
        pitch.0
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name_with_octave())
    }
}
