//! compile.rs
//!
//! Turns the tick-based melody line into a flat list of (frequency, milliseconds)
//! events, inserting rests for the gaps between notes.

use crate::pitch::frequency;
use crate::reducer::TimelineSegment;
use crate::tempo::TempoMap;

/// Frequency 0 marks a rest.
pub const REST: u32 = 0;

/// A tone (or rest) held for `duration` milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DurationEvent {
    pub frequency: u32,
    pub duration: u64,
}

impl DurationEvent {
    pub fn tone(frequency: u32, duration: u64) -> Self {
        Self { frequency, duration }
    }

    pub fn rest(duration: u64) -> Self {
        Self { frequency: REST, duration }
    }
}

/// Walk the timeline and emit an optional rest plus one tone per segment.
///
/// Equal consecutive tones are left separate. Segments that start before the
/// previous one ended produce no rest; the overlap is not repaired.
pub fn compile(timeline: &[TimelineSegment], tempo: &TempoMap) -> Vec<DurationEvent> {
    let Some(first) = timeline.first() else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(timeline.len() * 2);
    let mut cursor = first.start_tick;

    for seg in timeline {
        if seg.start_tick > cursor {
            let rest = tempo.duration_of(seg.start_tick - cursor, cursor);
            if rest > 0 {
                out.push(DurationEvent::rest(rest));
            }
        }
        let dur = tempo.duration_of(seg.end_tick - seg.start_tick, seg.start_tick);
        out.push(DurationEvent::tone(frequency(seg.pitch.into()), dur));
        cursor = seg.end_tick;
    }

    out
}

/// Total length in milliseconds.
pub fn total_duration(events: &[DurationEvent]) -> u64 {
    events.iter().map(|e| e.duration).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::TempoChange;

    fn seg(pitch: u8, start_tick: u64, end_tick: u64) -> TimelineSegment {
        TimelineSegment { pitch, start_tick, end_tick }
    }

    #[test]
    fn empty_timeline_compiles_to_nothing() {
        assert!(compile(&[], &TempoMap::new(480, Vec::new())).is_empty());
    }

    #[test]
    fn gap_becomes_rest_between_equal_tones() {
        let tempo = TempoMap::new(480, Vec::new());
        let out = compile(&[seg(69, 0, 500), seg(69, 600, 900)], &tempo);
        assert_eq!(
            out,
            vec![DurationEvent::tone(440, 521), DurationEvent::rest(104), DurationEvent::tone(440, 313)]
        );
    }

    #[test]
    fn leading_silence_is_not_emitted() {
        let tempo = TempoMap::new(480, Vec::new());
        let out = compile(&[seg(69, 960, 1440)], &tempo);
        assert_eq!(out, vec![DurationEvent::tone(440, 500)]);
    }

    #[test]
    fn rest_rounding_to_zero_is_skipped() {
        // 1 tick at 480 tpb is ~1.04 ms, 1 tick at 9600 tpb is ~0.05 ms
        let tempo = TempoMap::new(9600, Vec::new());
        let out = compile(&[seg(69, 0, 9600), seg(81, 9601, 19201)], &tempo);
        assert_eq!(out, vec![DurationEvent::tone(440, 500), DurationEvent::tone(880, 500)]);
    }

    #[test]
    fn contiguous_timeline_conserves_time() {
        let tempo = TempoMap::new(
            480,
            vec![
                TempoChange { tick: 0, us_per_beat: 600_000 },
                TempoChange { tick: 1000, us_per_beat: 433_333 },
            ],
        );
        let timeline = [seg(60, 0, 333), seg(62, 333, 1000), seg(64, 1000, 1777), seg(65, 1777, 2001)];
        let out = compile(&timeline, &tempo);
        assert_eq!(out.len(), timeline.len());

        let expected = tempo.duration_of(333, 0)
            + tempo.duration_of(667, 333)
            + tempo.duration_of(1001, 1000);
        let total = total_duration(&out);
        let boundaries = timeline.len() as u64;
        assert!(total.abs_diff(expected) <= boundaries, "{total} vs {expected}");
    }

    #[test]
    fn rest_uses_tempo_at_cursor() {
        let tempo = TempoMap::new(480, vec![TempoChange { tick: 480, us_per_beat: 1_000_000 }]);
        let out = compile(&[seg(69, 0, 480), seg(69, 960, 1440)], &tempo);
        assert_eq!(
            out,
            vec![DurationEvent::tone(440, 500), DurationEvent::rest(1_000), DurationEvent::tone(440, 1_000)]
        );
    }

    #[test]
    fn overlapping_segments_pass_through_unrepaired() {
        // known boundary: the second note starts inside the first one
        let tempo = TempoMap::new(480, Vec::new());
        let out = compile(&[seg(60, 0, 960), seg(64, 480, 720), seg(67, 960, 1440)], &tempo);
        assert_eq!(
            out,
            vec![
                DurationEvent::tone(262, 1_000),
                DurationEvent::tone(330, 250),
                DurationEvent::rest(250),
                DurationEvent::tone(392, 500),
            ]
        );
    }
}
