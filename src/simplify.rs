//! simplify.rs
//!
//! Shrinks a melody so it fits a small microcontroller table.
//!
//! The passes run in a fixed order:
//!  1. merge neighbours that share a frequency (rests included)
//!  2. snap each duration to the nearest multiple of the unit, never below one unit
//!  3. fold events shorter than the minimum into the previous kept event
//!  4. cap the number of entries, folding the tail into the last kept entry
//!
//! Merging uses the exact durations, so it has to happen before quantization.
//! The unit is in microseconds (120 BPM / 8 = 62.5 ms). Kept events count whole
//! units and are truncated to milliseconds only on output.

use crate::compile::DurationEvent;
use crate::tempo::round_div;

const US_PER_MS: u64 = 1_000;

/// Unit used when a melody has no positive duration to estimate one from.
pub const FALLBACK_UNIT_US: u64 = 128_000;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unit duration must be positive")]
    ZeroUnit,
    #[error("unit duration of {0} µs is below the 1 ms output resolution")]
    UnitBelowResolution(u64),
    #[error("quantization denominator must be positive")]
    ZeroDenominator,
    #[error("tempo of {us_per_beat} µs/beat split into {denom} gives a unit below 1 ms")]
    UnitTooSmall { us_per_beat: u32, denom: u32 },
}

/// Parameters of [`simplify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimplifyConfig {
    /// Quantization grid in microseconds
    pub unit_us: u64,
    /// Events shorter than this many ms are folded into their predecessor
    pub minimum_duration: u64,
    /// Hard cap on output entries
    pub maximum_count: usize,
}

impl Default for SimplifyConfig {
    /// An eighth of a 120 BPM beat, 80 ms minimum, 400 entries.
    fn default() -> Self {
        Self { unit_us: 62_500, minimum_duration: 80, maximum_count: 400 }
    }
}

impl SimplifyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.unit_us {
            0 => Err(ConfigError::ZeroUnit),
            u if u < US_PER_MS => Err(ConfigError::UnitBelowResolution(u)),
            _ => Ok(()),
        }
    }
}

/// Quantization unit for a tempo: one beat split into `denom` parts, in µs.
pub fn unit_from_tempo(us_per_beat: u32, denom: u32) -> Result<u64, ConfigError> {
    if denom == 0 {
        return Err(ConfigError::ZeroDenominator);
    }
    let unit = round_div(us_per_beat as u128, denom as u128) as u64;
    if unit < US_PER_MS {
        return Err(ConfigError::UnitTooSmall { us_per_beat, denom });
    }
    Ok(unit)
}

/// Guess a unit for a melody whose tempo is unknown: half its median event
/// length, rounded to whole milliseconds.
pub fn estimate_unit(events: &[DurationEvent]) -> u64 {
    let mut durs: Vec<u64> = events.iter().map(|e| e.duration).filter(|&d| d > 0).collect();
    if durs.is_empty() {
        return FALLBACK_UNIT_US;
    }
    durs.sort_unstable();
    let median = durs[durs.len() / 2];
    round_div(median as u128 * 4, 8).max(1) as u64 * US_PER_MS
}

/// Number of units nearest to `duration` ms, at least one.
fn units(duration: u64, unit_us: u64) -> u64 {
    round_div(duration as u128 * US_PER_MS as u128, unit_us as u128).max(1) as u64
}

/// Milliseconds spanned by `count` units, truncated.
fn to_ms(count: u64, unit_us: u64) -> u64 {
    (count as u128 * unit_us as u128 / US_PER_MS as u128) as u64
}

/// Nearest positive multiple of the unit, truncated to whole milliseconds.
pub fn quantize(duration: u64, unit_us: u64) -> u64 {
    to_ms(units(duration, unit_us), unit_us)
}

/// Run all simplification passes.
///
/// Fails before touching `events` when the configuration is invalid. An empty
/// input gives an empty output.
pub fn simplify(events: &[DurationEvent], cfg: &SimplifyConfig) -> Result<Vec<DurationEvent>, ConfigError> {
    cfg.validate()?;
    if events.is_empty() {
        return Ok(Vec::new());
    }

    let merged = merge_adjacent(events);
    let kept = quantize_and_absorb(&merged, cfg);
    let out: Vec<DurationEvent> = cap_count(kept, cfg.maximum_count)
        .into_iter()
        .map(|(frequency, count)| DurationEvent { frequency, duration: to_ms(count, cfg.unit_us) })
        .collect();
    log::debug!(
        "simplified {} events -> {} merged -> {} kept",
        events.len(),
        merged.len(),
        out.len()
    );
    Ok(out)
}

fn merge_adjacent(events: &[DurationEvent]) -> Vec<DurationEvent> {
    let mut merged: Vec<DurationEvent> = Vec::with_capacity(events.len());
    for ev in events {
        match merged.last_mut() {
            Some(last) if last.frequency == ev.frequency => last.duration += ev.duration,
            _ => merged.push(*ev),
        }
    }
    merged
}

/// (frequency, unit count) per kept event
fn quantize_and_absorb(merged: &[DurationEvent], cfg: &SimplifyConfig) -> Vec<(u32, u64)> {
    let mut kept: Vec<(u32, u64)> = Vec::with_capacity(merged.len());
    for ev in merged {
        let count = units(ev.duration, cfg.unit_us);
        if to_ms(count, cfg.unit_us) < cfg.minimum_duration {
            match kept.last_mut() {
                Some(last) => last.1 += count,
                None => kept.push((crate::compile::REST, count)),
            }
            continue;
        }
        // absorption can leave two equal neighbours; join them
        match kept.last_mut() {
            Some(last) if last.0 == ev.frequency => last.1 += count,
            _ => kept.push((ev.frequency, count)),
        }
    }
    kept
}

fn cap_count(mut kept: Vec<(u32, u64)>, maximum_count: usize) -> Vec<(u32, u64)> {
    if maximum_count > 0 && kept.len() <= maximum_count {
        return kept;
    }
    let tail = kept.split_off(maximum_count.saturating_sub(1));
    let tail_units: u64 = tail.iter().map(|e| e.1).sum();
    match kept.last_mut() {
        Some(last) => last.1 += tail_units,
        None => kept.push((crate::compile::REST, tail_units)),
    }
    kept
}
