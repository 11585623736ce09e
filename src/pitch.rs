/// MIDI key of the tuning reference (A4)
pub const A4_PITCH: i32 = 69;
pub const A4_HZ: f64 = 440.0;

/// Equal-temperament frequency of a MIDI pitch, rounded to whole hertz.
///
/// Pitches outside 0..=127 are computed the same way.
pub fn frequency(pitch: i32) -> u32 {
    let semitones = (pitch - A4_PITCH) as f64 / 12.0;
    (A4_HZ * semitones.exp2()).round() as u32
}
