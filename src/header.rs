//! header.rs
//!
//! Writes melodies for the firmware side and reads them back.
//!
//! The firmware stores a melody as an array of
//!
//! ```c
//! typedef struct {
//!     uint16_t freq;
//!     uint16_t duration;
//! } Note_t;
//! ```
//!
//! either compiled in from a generated C header or loaded as raw little-endian
//! records with the same layout. Both fields are 16 bit, so larger values are
//! clamped to 0xFFFF (never wrapped) and zero-length entries are left out.

pub use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::{
    fmt::Write as _,
    io::Write,
    path::Path,
};
use tempfile::NamedTempFile;

use crate::compile::DurationEvent;

const MAX_UINT16: u64 = 0xFFFF;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid include guard: {0:?}")]
    InvalidGuard(String),
    #[error("formatting header text")]
    Format(#[from] std::fmt::Error),
}

/// Output flavour of the melody table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// C header with a `melody[]` array
    Header,
    /// Packed little-endian Note_t records
    Binary,
}

/// Firmware-ready (freq, duration) pairs: zero durations dropped, fields clamped.
fn records(events: &[DurationEvent]) -> impl Iterator<Item = (u16, u16)> + '_ {
    events
        .iter()
        .filter(|e| e.duration > 0)
        .map(|e| (clamp_u16(e.frequency as u64), clamp_u16(e.duration)))
}

fn clamp_u16(v: u64) -> u16 {
    v.min(MAX_UINT16) as u16
}

/// Include guard derived from the output file name, e.g. `melody_simple.h` -> `MELODY_SIMPLE_H`.
pub fn guard_for(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let mut guard: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    if guard.is_empty() || guard.starts_with(|c: char| c.is_ascii_digit()) {
        guard.insert_str(0, "MELODY_");
    }
    guard.push_str("_H");
    guard
}

/// A guard must be usable as a C preprocessor identifier.
pub fn check_guard(guard: &str) -> Result<(), HeaderError> {
    let mut chars = guard.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid { Ok(()) } else { Err(HeaderError::InvalidGuard(guard.to_string())) }
}

/// Render the C header text.
pub fn render_header(events: &[DurationEvent], guard: &str) -> Result<String, HeaderError> {
    check_guard(guard)?;
    let mut s = String::new();
    write_header_text(&mut s, events, guard)?;
    Ok(s)
}

fn write_header_text(s: &mut String, events: &[DurationEvent], guard: &str) -> std::fmt::Result {
    writeln!(s, "/* Auto-generated by midi-buzzer */")?;
    writeln!(s, "#ifndef {guard}")?;
    writeln!(s, "#define {guard}\n")?;
    writeln!(s, "#include \"main.h\"\n")?;
    writeln!(s, "typedef struct {{\n    uint16_t freq;\n    uint16_t duration;\n}} Note_t;\n")?;
    writeln!(s, "static const Note_t melody[] = {{")?;
    for (freq, dur) in records(events) {
        writeln!(s, "  {{{freq}, {dur}}},")?;
    }
    writeln!(s, "}};\n")?;
    writeln!(s, "static const size_t melody_len = sizeof(melody)/sizeof(melody[0]);\n")?;
    writeln!(s, "#endif /* {guard} */")
}

/// Encode packed Note_t records.
pub fn encode_binary(events: &[DurationEvent]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(events.len() * 4);
    let mut rec = [0u8; 4];
    for (freq, dur) in records(events) {
        LittleEndian::write_u16(&mut rec[..2], freq);
        LittleEndian::write_u16(&mut rec[2..], dur);
        buf.extend_from_slice(&rec);
    }
    buf
}

/// Write a C header to `path`.
pub fn write_header(events: &[DurationEvent], path: &Path, guard: &str) -> Result<()> {
    let text = render_header(events, guard)?;
    write_atomic(path, text.as_bytes())?;
    log::info!("wrote {:?} with {} events", path, records(events).count());
    Ok(())
}

/// Write raw Note_t records to `path`.
pub fn write_binary(events: &[DurationEvent], path: &Path) -> Result<()> {
    let bytes = encode_binary(events);
    write_atomic(path, &bytes)?;
    log::info!("wrote {:?} with {} records", path, bytes.len() / 4);
    Ok(())
}

/// Write through a temp file next to `path` so a failure never leaves a truncated table.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).with_context(|| format!("creating temp file in {:?}", dir))?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}

/// Extract `{freq, dur},` entries from a generated header.
///
/// Lines without such an entry are skipped, so guards, typedefs and comments
/// need no special handling.
pub fn parse_header(text: &str) -> Vec<DurationEvent> {
    text.lines().filter_map(parse_entry).collect()
}

fn parse_entry(line: &str) -> Option<DurationEvent> {
    let open = line.find('{')?;
    let rest = &line[open + 1..];
    let close = rest.find('}')?;
    if !rest[close + 1..].trim_start().starts_with(',') {
        return None;
    }
    let (freq, dur) = rest[..close].split_once(',')?;
    let frequency = parse_digits(freq)?;
    let duration = parse_digits(dur)?;
    Some(DurationEvent { frequency: u32::try_from(frequency).ok()?, duration })
}

fn parse_digits(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Read a generated header from disk.
pub fn read_header(path: &Path) -> Result<Vec<DurationEvent>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    Ok(parse_header(&text))
}
