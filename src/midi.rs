//! midi.rs
//!
//! Reads a Standard MIDI File (SMF) into one flat, tick-ordered stream holding
//! only what melody extraction looks at: note starts, note ends and tempo changes.
//!
//! ### Timing in an SMF
//! - Each track event stores a delta in "ticks" from the previous event on that track.
//! - The header gives the number of ticks per beat (quarter note).
//! - Set Tempo meta events give the length of one beat in microseconds.
//!
//! Deltas are summed into absolute ticks per track, a NoteOn with velocity 0 is
//! reported as a note end, and all tracks are merged by tick. Ticks stay ticks;
//! converting them to milliseconds is left to the tempo map.

use anyhow::{Context, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;

use crate::tempo::TempoChange;

/// Resolution assumed for SMPTE-timed files
const FALLBACK_TICKS_PER_BEAT: u16 = 480;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteKind {
    NoteStart,
    NoteEnd,
}

/// A note boundary on one track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: NoteKind,
    pub pitch: u8,
    pub velocity: u8,
    pub tick: u64,
    pub track: usize,
}

impl NoteEvent {
    /// A NoteStart with velocity 0 is a NoteEnd.
    pub fn start(pitch: u8, velocity: u8, tick: u64, track: usize) -> Self {
        let kind = if velocity == 0 { NoteKind::NoteEnd } else { NoteKind::NoteStart };
        Self { kind, pitch, velocity, tick, track }
    }

    pub fn end(pitch: u8, tick: u64, track: usize) -> Self {
        Self { kind: NoteKind::NoteEnd, pitch, velocity: 0, tick, track }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Note(NoteEvent),
    Tempo(TempoChange),
}

impl Event {
    pub fn tick(&self) -> u64 {
        match self {
            Event::Note(n) => n.tick,
            Event::Tempo(t) => t.tick,
        }
    }
}

/// Everything the pipeline needs from a parsed file.
#[derive(Clone, Debug)]
pub struct EventStream {
    /// Pulses per quarter note (from header)
    pub ticks_per_beat: u16,
    /// All events from all tracks, ordered by tick
    pub events: Vec<Event>,
}

/// Read and parse a MIDI file from disk.
pub fn read_file(path: &Path) -> Result<EventStream> {
    let data = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let smf = Smf::parse(&data).with_context(|| format!("parsing {:?}", path))?;
    log::info!(
        "MIDI loaded: tracks={}, timing={:?}",
        smf.tracks.len(),
        smf.header.timing
    );
    Ok(from_smf(&smf))
}

/// Build the merged event stream of a parsed file.
///
/// Tracks are concatenated in file order and then stably sorted by tick, so
/// events sharing a tick keep their original order.
pub fn from_smf(smf: &Smf<'_>) -> EventStream {
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(..) => {
            log::warn!(
                "SMPTE timing is not supported, assuming {} ticks per beat",
                FALLBACK_TICKS_PER_BEAT
            );
            FALLBACK_TICKS_PER_BEAT
        }
    };

    let mut events = Vec::new();
    for (track, tr) in smf.tracks.iter().enumerate() {
        let mut abs_ticks: u64 = 0;
        let mut notes = 0usize;

        for ev in tr {
            abs_ticks += ev.delta.as_int() as u64;

            match ev.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tp)) => {
                    events.push(Event::Tempo(TempoChange { tick: abs_ticks, us_per_beat: tp.as_int() }));
                }
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } => {
                        if vel.as_int() > 0 {
                            notes += 1;
                        }
                        events.push(Event::Note(NoteEvent::start(key.as_int(), vel.as_int(), abs_ticks, track)));
                    }
                    MidiMessage::NoteOff { key, .. } => {
                        events.push(Event::Note(NoteEvent::end(key.as_int(), abs_ticks, track)));
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        log::debug!("track {}: {} notes, {} ticks", track, notes, abs_ticks);
    }

    events.sort_by_key(|e| e.tick());

    EventStream { ticks_per_beat, events }
}

/// Format a millisecond length as MM:SS string for logging.
pub fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1_000;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}", mins, secs)
}
