//! tempo.rs
//!
//! Tick to millisecond conversion over a piecewise-constant tempo schedule.
//!
//! A MIDI file states its timing in ticks. How long a tick lasts depends on the
//! header's ticks-per-beat and on the most recent Set Tempo meta event, which
//! gives the length of one beat in microseconds. Before the first tempo event
//! the file runs at 120 BPM.

/// 500,000 µs per quarter note = 120 BPM
pub const DEFAULT_US_PER_BEAT: u32 = 500_000;

const US_PER_MS: u128 = 1_000;

/// A tempo change at an absolute tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TempoChange {
    pub tick: u64,
    pub us_per_beat: u32,
}

/// Immutable, tick-ordered tempo schedule.
#[derive(Clone, Debug)]
pub struct TempoMap {
    ticks_per_beat: u16,
    changes: Vec<TempoChange>,
}

impl TempoMap {
    /// Build a map from an unordered set of changes.
    /// Changes sharing a tick keep their relative order, so the later one wins.
    pub fn new(ticks_per_beat: u16, mut changes: Vec<TempoChange>) -> Self {
        changes.sort_by_key(|c| c.tick);
        Self { ticks_per_beat: ticks_per_beat.max(1), changes }
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    /// Microseconds per beat in force at `tick`.
    pub fn rate_at(&self, tick: u64) -> u32 {
        let idx = self.changes.partition_point(|c| c.tick <= tick);
        match idx {
            0 => DEFAULT_US_PER_BEAT,
            i => self.changes[i - 1].us_per_beat,
        }
    }

    /// The last tempo the file sets, or the default when it sets none.
    pub fn final_rate(&self) -> u32 {
        self.changes.last().map(|c| c.us_per_beat).unwrap_or(DEFAULT_US_PER_BEAT)
    }

    /// Length in milliseconds of `tick_delta` ticks starting at `tick_position`.
    ///
    /// The rate is sampled once, at `tick_position`. A tempo change falling
    /// inside the delta does not split it.
    pub fn duration_of(&self, tick_delta: u64, tick_position: u64) -> u64 {
        let num = tick_delta as u128 * self.rate_at(tick_position) as u128;
        let den = self.ticks_per_beat as u128 * US_PER_MS;
        round_div(num, den) as u64
    }
}

/// Integer division rounding half away from zero (operands are non-negative).
pub(crate) fn round_div(num: u128, den: u128) -> u128 {
    (2 * num + den) / (2 * den)
}
