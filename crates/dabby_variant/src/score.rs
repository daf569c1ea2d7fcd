//! In-memory score: parts made of timed note, chord and rest events.

use crate::pitch::Pitch;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// What sounds during an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventKind {
    Note { pitch: Pitch },
    Chord { pitches: Vec<Pitch> },
    Rest,
}

/// A single event of a part, timed in ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub onset: u32,
    pub duration: u32,
    pub velocity: u8,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn note(onset: u32, duration: u32, pitch: Pitch) -> Self {
        Self {
            onset,
            duration,
            velocity: 80,
            kind: EventKind::Note { pitch },
        }
    }

    /// Builds a chord with its tones sorted low to high. A single tone is a note.
    pub fn chord(onset: u32, duration: u32, mut pitches: Vec<Pitch>) -> Result<Self> {
        pitches.sort();
        pitches.dedup();
        let kind = match pitches.len() {
            0 => bail!("A chord needs at least one pitch."),
            1 => EventKind::Note { pitch: pitches[0] },
            _ => EventKind::Chord { pitches },
        };
        Ok(Self {
            onset,
            duration,
            velocity: 80,
            kind,
        })
    }

    pub fn rest(onset: u32, duration: u32) -> Self {
        Self {
            onset,
            duration,
            velocity: 0,
            kind: EventKind::Rest,
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn is_note(&self) -> bool {
        matches!(self.kind, EventKind::Note { .. })
    }

    pub fn is_chord(&self) -> bool {
        matches!(self.kind, EventKind::Chord { .. })
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.kind, EventKind::Rest)
    }

    pub fn end(&self) -> u32 {
        self.onset.saturating_add(self.duration)
    }

    /// Every sounding pitch, low to high. Empty for rests.
    pub fn pitches(&self) -> &[Pitch] {
        match &self.kind {
            EventKind::Note { pitch } => std::slice::from_ref(pitch),
            EventKind::Chord { pitches } => pitches,
            EventKind::Rest => &[],
        }
    }

    /// The note's pitch, or the chord's functional root.
    pub fn root(&self) -> Option<Pitch> {
        match &self.kind {
            EventKind::Note { pitch } => Some(*pitch),
            EventKind::Chord { pitches } => chord_root(pitches),
            EventKind::Rest => None,
        }
    }
}

/// Picks the tone that has the most other chord tones a third, fifth or seventh
/// above it (modulo the octave). Ties go to the lowest sounding tone.
pub fn chord_root(pitches: &[Pitch]) -> Option<Pitch> {
    let mut best: Option<(usize, Pitch)> = None;
    for &candidate in pitches {
        let support = pitches
            .iter()
            .filter(|other| {
                let interval = (12 + other.pitch_class() - candidate.pitch_class()) % 12;
                matches!(interval, 3 | 4 | 7 | 10 | 11)
            })
            .count();
        let better = match best {
            None => true,
            Some((score, pitch)) => support > score || (support == score && candidate < pitch),
        };
        if better {
            best = Some((support, candidate));
        }
    }
    best.map(|(_, pitch)| pitch)
}

/// Non-note content carried through a variant unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ControlKind {
    /// Microseconds per quarter note.
    Tempo { micros_per_quarter: u32 },
    TimeSignature {
        numerator: u8,
        denominator_power: u8,
        clocks_per_click: u8,
        notated_32nds_per_quarter: u8,
    },
    KeySignature { sharps: i8, minor: bool },
    Controller { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    /// Raw 14-bit value, 0x2000 is centered.
    PitchBend { value: u16 },
    ChannelPressure { pressure: u8 },
    KeyPressure { key: u8, pressure: u8 },
}

impl ControlKind {
    /// Whether the event belongs to the conductor track rather than a channel.
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Self::Tempo { .. } | Self::TimeSignature { .. } | Self::KeySignature { .. }
        )
    }
}

/// A control event at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub tick: u32,
    #[serde(flatten)]
    pub kind: ControlKind,
}

impl Control {
    pub fn new(tick: u32, kind: ControlKind) -> Self {
        Self { tick, kind }
    }

    pub fn tempo(tick: u32, micros_per_quarter: u32) -> Self {
        Self::new(tick, ControlKind::Tempo { micros_per_quarter })
    }
}

/// One instrument line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Part {
    pub name: Option<String>,
    pub channel: u8,
    /// Program selected at the start of the part.
    pub program: Option<u8>,
    pub events: Vec<Event>,
    /// Channel messages other than notes, in tick order.
    #[serde(default)]
    pub controls: Vec<Control>,
}

impl Part {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Notes and chords in temporal order, rests skipped.
    pub fn sounding_events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|event| !event.is_rest())
    }

    pub fn sounding_events_mut(&mut self) -> impl Iterator<Item = &mut Event> {
        self.events.iter_mut().filter(|event| !event.is_rest())
    }

    /// Roots of every sounding event, in order.
    pub fn roots(&self) -> Vec<Pitch> {
        self.sounding_events().filter_map(Event::root).collect()
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("channel {}", self.channel),
        }
    }
}

/// A whole piece: timing resolution, conductor events and parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub ticks_per_quarter: u16,
    /// Tempo map and signatures, in tick order.
    #[serde(default)]
    pub conductor: Vec<Control>,
    pub parts: Vec<Part>,
}

impl Score {
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter,
            conductor: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Tempo in effect at the start, microseconds per quarter note.
    pub fn initial_tempo(&self) -> Option<u32> {
        self.conductor.iter().find_map(|control| match control.kind {
            ControlKind::Tempo { micros_per_quarter } => Some(micros_per_quarter),
            _ => None,
        })
    }

    pub fn sounding_event_count(&self) -> usize {
        self.parts.iter().map(|part| part.sounding_events().count()).sum()
    }
}
