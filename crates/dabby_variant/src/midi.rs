// Standard MIDI File input and output.
//
// Reading groups every (track, channel) pair that carries notes or controls
// into a Part. Notes that start on the same tick become one chord, and gaps
// between sounding events become rests, so the substitution layer sees the same
// flattened note/chord/rest sequence a notation library would give it. Tempo,
// signatures and channel controls are kept at their ticks so a variant differs
// from its input only in pitch.
//
// Writing produces SMF Format 1: a conductor track followed by one track per part.

use crate::pitch::Pitch;
use crate::score::{Control, ControlKind, Event, Part, Score};
use anyhow::{anyhow, bail, Context, Result};
use midly::{
    num::{u14, u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, Track, TrackEvent,
    TrackEventKind,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// A note as found in the file, before chords and rests are reconstructed.
#[derive(Debug, Clone, Copy)]
struct RawNote {
    onset: u32,
    end: u32,
    key: u8,
    velocity: u8,
}

pub fn read_score(path: &Path) -> Result<Score> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    score_from_smf_bytes(&bytes).with_context(|| format!("Failed to load {}", path.display()))
}

pub fn score_from_smf_bytes(bytes: &[u8]) -> Result<Score> {
    let smf = Smf::parse(bytes).map_err(|err| anyhow!("Invalid MIDI data: {err}"))?;
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(..) => bail!("SMPTE timecode timing is not supported."),
    };

    let mut score = Score::new(ticks_per_quarter);
    for track in &smf.tracks {
        let mut tick: u32 = 0;
        let mut name: Option<String> = None;
        let mut programs: BTreeMap<u8, u8> = BTreeMap::new();
        let mut controls: BTreeMap<u8, Vec<Control>> = BTreeMap::new();
        let mut sounding: BTreeMap<(u8, u8), (u32, u8)> = BTreeMap::new();
        let mut notes: BTreeMap<u8, Vec<RawNote>> = BTreeMap::new();

        for event in track {
            tick = tick.saturating_add(event.delta.as_int());
            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                    name = Some(String::from_utf8_lossy(raw).into_owned());
                }
                TrackEventKind::Meta(meta) => {
                    if let Some(kind) = conductor_kind(&meta) {
                        score.conductor.push(Control::new(tick, kind));
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            let key = key.as_int();
                            // A retriggered key ends the note already sounding.
                            if let Some((onset, velocity)) = sounding.remove(&(channel, key)) {
                                notes.entry(channel).or_default().push(RawNote {
                                    onset,
                                    end: tick,
                                    key,
                                    velocity,
                                });
                            }
                            sounding.insert((channel, key), (tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let key = key.as_int();
                            if let Some((onset, velocity)) = sounding.remove(&(channel, key)) {
                                notes.entry(channel).or_default().push(RawNote {
                                    onset,
                                    end: tick,
                                    key,
                                    velocity,
                                });
                            }
                        }
                        MidiMessage::ProgramChange { program }
                            if tick == 0 && !programs.contains_key(&channel) =>
                        {
                            programs.insert(channel, program.as_int());
                        }
                        other => {
                            if let Some(kind) = channel_kind(&other) {
                                controls
                                    .entry(channel)
                                    .or_default()
                                    .push(Control::new(tick, kind));
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        for ((channel, key), (onset, velocity)) in sounding {
            notes.entry(channel).or_default().push(RawNote {
                onset,
                end: tick.max(onset),
                key,
                velocity,
            });
        }

        let mut channels: Vec<u8> = notes.keys().chain(controls.keys()).copied().collect();
        channels.sort_unstable();
        channels.dedup();
        for channel in channels {
            let mut part = build_part(channel, notes.remove(&channel).unwrap_or_default())?;
            part.name = name.clone();
            part.program = programs.get(&channel).copied();
            part.controls = controls.remove(&channel).unwrap_or_default();
            score.parts.push(part);
        }
    }
    // Conductor events may come from any track; keep file order within a tick.
    score.conductor.sort_by_key(|control| control.tick);

    debug!(
        parts = score.parts.len(),
        events = score.sounding_event_count(),
        conductor = score.conductor.len(),
        ticks_per_quarter,
        "read MIDI score"
    );
    Ok(score)
}

fn conductor_kind(meta: &MetaMessage<'_>) -> Option<ControlKind> {
    match *meta {
        MetaMessage::Tempo(tempo) => Some(ControlKind::Tempo {
            micros_per_quarter: tempo.as_int(),
        }),
        MetaMessage::TimeSignature(numerator, denominator_power, clocks_per_click, notated) => {
            Some(ControlKind::TimeSignature {
                numerator,
                denominator_power,
                clocks_per_click,
                notated_32nds_per_quarter: notated,
            })
        }
        MetaMessage::KeySignature(sharps, minor) => {
            Some(ControlKind::KeySignature { sharps, minor })
        }
        _ => None,
    }
}

fn channel_kind(message: &MidiMessage) -> Option<ControlKind> {
    match *message {
        MidiMessage::Controller { controller, value } => Some(ControlKind::Controller {
            controller: controller.as_int(),
            value: value.as_int(),
        }),
        MidiMessage::ProgramChange { program } => Some(ControlKind::ProgramChange {
            program: program.as_int(),
        }),
        MidiMessage::PitchBend { bend } => Some(ControlKind::PitchBend {
            value: bend.0.as_int(),
        }),
        MidiMessage::ChannelAftertouch { vel } => Some(ControlKind::ChannelPressure {
            pressure: vel.as_int(),
        }),
        MidiMessage::Aftertouch { key, vel } => Some(ControlKind::KeyPressure {
            key: key.as_int(),
            pressure: vel.as_int(),
        }),
        MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. } => None,
    }
}

fn build_part(channel: u8, mut raw: Vec<RawNote>) -> Result<Part> {
    raw.sort_by_key(|note| (note.onset, note.key));

    let mut part = Part::new(channel);
    let mut cursor = 0u32;
    let mut start = 0usize;
    while start < raw.len() {
        let onset = raw[start].onset;
        let len = raw[start..]
            .iter()
            .take_while(|note| note.onset == onset)
            .count();
        let group = &raw[start..start + len];
        start += len;

        if onset > cursor {
            part.push(Event::rest(cursor, onset - cursor));
        }

        let end = group.iter().map(|note| note.end).max().unwrap_or(onset);
        let velocity = group.iter().map(|note| note.velocity).max().unwrap_or(0);
        let pitches = group
            .iter()
            .map(|note| Pitch::new(note.key))
            .collect::<Result<Vec<_>>>()?;
        part.push(Event::chord(onset, end - onset, pitches)?.with_velocity(velocity));
        cursor = cursor.max(end);
    }
    Ok(part)
}

pub fn write_score(score: &Score, path: &Path) -> Result<()> {
    let bytes = score_to_smf_bytes(score)?;
    std::fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn score_to_smf_bytes(score: &Score) -> Result<Vec<u8>> {
    let smf = score_to_smf(score)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf).context("Failed to encode MIDI data")?;
    Ok(buf)
}

fn score_to_smf(score: &Score) -> Result<Smf<'_>> {
    if score.ticks_per_quarter == 0 || score.ticks_per_quarter > 0x7FFF {
        bail!(
            "Ticks per quarter note must be in 1..=32767, got {}.",
            score.ticks_per_quarter
        );
    }
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(score.ticks_per_quarter)),
    ));

    let mut conductor = score.conductor.clone();
    conductor.sort_by_key(|control| control.tick);
    let mut timeline = Vec::with_capacity(conductor.len());
    for control in &conductor {
        timeline.push((control.tick, TrackEventKind::Meta(conductor_meta(&control.kind)?)));
    }
    smf.tracks.push(encode_deltas(timeline, "the conductor track")?);

    for part in &score.parts {
        smf.tracks.push(part_to_track(part)?);
    }
    Ok(smf)
}

fn conductor_meta(kind: &ControlKind) -> Result<MetaMessage<'static>> {
    Ok(match *kind {
        ControlKind::Tempo { micros_per_quarter } => {
            if micros_per_quarter > 0xFF_FFFF {
                bail!("Tempo {micros_per_quarter} does not fit in 24 bits.");
            }
            MetaMessage::Tempo(u24::new(micros_per_quarter))
        }
        ControlKind::TimeSignature {
            numerator,
            denominator_power,
            clocks_per_click,
            notated_32nds_per_quarter,
        } => MetaMessage::TimeSignature(
            numerator,
            denominator_power,
            clocks_per_click,
            notated_32nds_per_quarter,
        ),
        ControlKind::KeySignature { sharps, minor } => MetaMessage::KeySignature(sharps, minor),
        other => bail!("{other:?} is a channel message, not a conductor event."),
    })
}

fn data_byte(value: u8, what: &str) -> Result<u7> {
    if value > 127 {
        bail!("{what} {value} is out of range 0..=127.");
    }
    Ok(u7::new(value))
}

fn channel_message(kind: &ControlKind) -> Result<MidiMessage> {
    Ok(match *kind {
        ControlKind::Controller { controller, value } => MidiMessage::Controller {
            controller: data_byte(controller, "Controller number")?,
            value: data_byte(value, "Controller value")?,
        },
        ControlKind::ProgramChange { program } => MidiMessage::ProgramChange {
            program: data_byte(program, "Program")?,
        },
        ControlKind::PitchBend { value } => {
            if value > 0x3FFF {
                bail!("Pitch bend {value} does not fit in 14 bits.");
            }
            MidiMessage::PitchBend {
                bend: PitchBend(u14::new(value)),
            }
        }
        ControlKind::ChannelPressure { pressure } => MidiMessage::ChannelAftertouch {
            vel: data_byte(pressure, "Channel pressure")?,
        },
        ControlKind::KeyPressure { key, pressure } => MidiMessage::Aftertouch {
            key: data_byte(key, "Key")?,
            vel: data_byte(pressure, "Key pressure")?,
        },
        other => bail!("{other:?} belongs to the conductor track, not a channel."),
    })
}

/// Turns absolute-tick events into a delta-timed track ending in EndOfTrack.
fn encode_deltas<'a>(
    timeline: Vec<(u32, TrackEventKind<'a>)>,
    label: &str,
) -> Result<Track<'a>> {
    let mut track: Track<'a> = Vec::with_capacity(timeline.len() + 1);
    let mut last_tick = 0u32;
    for (tick, kind) in timeline {
        let delta = tick - last_tick;
        if delta > 0x0FFF_FFFF {
            bail!("Gap of {delta} ticks in {label} does not fit a MIDI delta.");
        }
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    Ok(track)
}

// Ordering of messages sharing a tick: notes ending there, then controls, then
// note-ons, then the note-offs of zero-length notes starting there.
const RELEASE: u8 = 0;
const CONTROL: u8 = 1;
const ATTACK: u8 = 2;
const INSTANT_RELEASE: u8 = 3;

fn part_to_track(part: &Part) -> Result<Track<'_>> {
    if part.channel > 15 {
        bail!("MIDI channel {} is out of range 0..=15.", part.channel);
    }
    let channel = u4::new(part.channel);

    // (tick, order, key, message)
    let mut timeline: Vec<(u32, u8, u8, TrackEventKind<'_>)> = Vec::new();
    if let Some(name) = &part.name {
        timeline.push((
            0,
            RELEASE,
            0,
            TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
        ));
    }
    if let Some(program) = part.program {
        let message = MidiMessage::ProgramChange {
            program: u7::new(program.min(127)),
        };
        timeline.push((0, RELEASE, 0, TrackEventKind::Midi { channel, message }));
    }
    for control in &part.controls {
        let message = channel_message(&control.kind)?;
        timeline.push((
            control.tick,
            CONTROL,
            0,
            TrackEventKind::Midi { channel, message },
        ));
    }
    for event in part.sounding_events() {
        let vel = u7::new(event.velocity.clamp(1, 127));
        let release = if event.duration == 0 {
            INSTANT_RELEASE
        } else {
            RELEASE
        };
        for pitch in event.pitches() {
            let key = u7::new(pitch.midi());
            let on = MidiMessage::NoteOn { key, vel };
            let off = MidiMessage::NoteOff {
                key,
                vel: u7::new(0),
            };
            timeline.push((
                event.onset,
                ATTACK,
                pitch.midi(),
                TrackEventKind::Midi {
                    channel,
                    message: on,
                },
            ));
            timeline.push((
                event.end(),
                release,
                pitch.midi(),
                TrackEventKind::Midi {
                    channel,
                    message: off,
                },
            ));
        }
    }
    // Stable, so the name and program stay ahead of releases at tick 0 and
    // controls keep their order.
    timeline.sort_by_key(|&(tick, order, key, _)| (tick, order, key));

    encode_deltas(
        timeline
            .into_iter()
            .map(|(tick, _, _, kind)| (tick, kind))
            .collect(),
        &part.label(),
    )
}
