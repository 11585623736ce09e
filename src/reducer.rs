//! reducer.rs
//!
//! Reduces a polyphonic, multi-track event stream to a single melody line.
//!
//! A buzzer can only sound one pitch at a time. Notes are paired into closed
//! intervals, and when several intervals start on the same tick (a chord) only
//! the loudest survives, with the higher pitch breaking velocity ties.
//!
//! Intervals that start on different ticks are never compared, so two notes
//! may still overlap in the resulting timeline. A zero-length interval still
//! takes part in its chord; it is dropped only if it wins.

use std::collections::{BTreeMap, HashMap};

use crate::midi::{Event, NoteKind};
use crate::tempo::TempoMap;

/// One note of the melody line, `end_tick > start_tick`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineSegment {
    pub pitch: u8,
    pub start_tick: u64,
    pub end_tick: u64,
}

/// Output of [`reduce`]: the melody line plus the tempo schedule seen on the way.
#[derive(Clone, Debug)]
pub struct Reduction {
    pub timeline: Vec<TimelineSegment>,
    pub tempo: TempoMap,
}

#[derive(Clone, Copy, Debug)]
struct Closed {
    pitch: u8,
    start_tick: u64,
    end_tick: u64,
    velocity: u8,
}

impl Closed {
    fn beats(&self, other: &Closed) -> bool {
        (self.velocity, self.pitch) > (other.velocity, other.pitch)
    }
}

/// Extract the monophonic timeline from a tick-ordered event stream.
pub fn reduce(events: &[Event], ticks_per_beat: u16) -> Reduction {
    // pitch -> (start_tick, velocity)
    let mut active: HashMap<u8, (u64, u8)> = HashMap::new();
    // start_tick -> chord winner so far
    let mut by_start: BTreeMap<u64, Closed> = BTreeMap::new();
    let mut tempo_changes = Vec::new();

    for ev in events {
        let note = match ev {
            Event::Tempo(t) => {
                tempo_changes.push(*t);
                continue;
            }
            Event::Note(n) => n,
        };

        match note.kind {
            NoteKind::NoteStart => {
                active.insert(note.pitch, (note.tick, note.velocity));
            }
            NoteKind::NoteEnd => {
                let Some((start_tick, velocity)) = active.remove(&note.pitch) else {
                    log::debug!(
                        "ignoring unmatched note end: pitch {} at tick {} (track {})",
                        note.pitch,
                        note.tick,
                        note.track
                    );
                    continue;
                };
                let closed = Closed { pitch: note.pitch, start_tick, end_tick: note.tick, velocity };
                by_start
                    .entry(start_tick)
                    .and_modify(|winner| {
                        if closed.beats(winner) {
                            *winner = closed;
                        }
                    })
                    .or_insert(closed);
            }
        }
    }

    if !active.is_empty() {
        log::warn!("{} note(s) still sounding at end of stream, dropped", active.len());
    }

    let timeline = by_start
        .into_values()
        .filter(|c| {
            let keep = c.end_tick > c.start_tick;
            if !keep {
                log::debug!("dropping zero-length note: pitch {} at tick {}", c.pitch, c.start_tick);
            }
            keep
        })
        .map(|c| TimelineSegment { pitch: c.pitch, start_tick: c.start_tick, end_tick: c.end_tick })
        .collect();

    Reduction { timeline, tempo: TempoMap::new(ticks_per_beat, tempo_changes) }
}
