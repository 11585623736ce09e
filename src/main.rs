use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

mod compile;
mod header;
mod midi;
mod pitch;
mod reducer;
mod simplify;
mod tempo;

use compile::{DurationEvent, total_duration};
use header::{OutputFormat, check_guard, guard_for};
use midi::{EventStream, format_duration};
use simplify::{ConfigError, SimplifyConfig};
use tempo::TempoMap;

#[derive(Parser, Debug)]
#[command(version, about = "Turn MIDI melodies into note tables for a square-wave buzzer")]
struct Opt {
    /// Extra debug output
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the melody of a MIDI file
    Convert(ConvertArgs),
    /// Simplify a previously generated header again
    Resimplify(ResimplifyArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Path to the MIDI file
    midi: PathBuf,
    /// Output path (gets a _mono / _simple suffix in those modes)
    out: PathBuf,
    /// Quantize, merge and cap the melody
    #[arg(long)]
    simplify: bool,
    /// Write the unsimplified melody to <out>_mono; wins over --simplify
    #[arg(long, alias = "preserve-length")]
    monophonic: bool,
    /// Quantization grid: one beat split into this many units
    #[arg(long, default_value_t = 8)]
    denom: u32,
    /// Shorter events are folded into their predecessor
    #[arg(long, default_value_t = 80)]
    min_ms: u64,
    /// Maximum number of table entries
    #[arg(long, default_value_t = 400)]
    max_notes: usize,
    #[arg(long, value_enum, default_value_t = OutputFormat::Header)]
    format: OutputFormat,
    /// Include guard (defaults to one derived from the output file name)
    #[arg(long)]
    guard: Option<String>,
}

#[derive(Args, Debug)]
struct ResimplifyArgs {
    /// Header generated by `convert`
    input: PathBuf,
    out: PathBuf,
    /// Quantization unit in ms (estimated from the median note length if absent)
    #[arg(long)]
    unit_ms: Option<u64>,
    #[arg(long, default_value_t = 80)]
    min_ms: u64,
    #[arg(long, default_value_t = 300)]
    max_notes: usize,
    #[arg(long)]
    guard: Option<String>,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let log_level = if opt.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match opt.cmd {
        Command::Convert(args) => convert(&args),
        Command::Resimplify(args) => resimplify(&args),
    }
}

/// Reduce the stream to one voice and convert it to milliseconds.
fn extract_melody(stream: &EventStream) -> (Vec<DurationEvent>, TempoMap) {
    let reduction = reducer::reduce(&stream.events, stream.ticks_per_beat);
    log::info!(
        "extracted {} notes, ticks_per_beat={}, {} tempo changes, final tempo={} µs/qn",
        reduction.timeline.len(),
        reduction.tempo.ticks_per_beat(),
        reduction.tempo.changes().len(),
        reduction.tempo.final_rate()
    );
    let notes = compile::compile(&reduction.timeline, &reduction.tempo);
    (notes, reduction.tempo)
}

fn convert(args: &ConvertArgs) -> Result<()> {
    let simplified = args.simplify && !args.monophonic;
    // reject bad settings before any work
    if simplified && args.denom == 0 {
        return Err(ConfigError::ZeroDenominator.into());
    }
    let out = if args.monophonic {
        with_suffix(&args.out, "_mono")
    } else if simplified {
        with_suffix(&args.out, "_simple")
    } else {
        args.out.clone()
    };
    let guard = args.guard.clone().unwrap_or_else(|| guard_for(&out));
    check_guard(&guard)?;

    log::info!("opening MIDI: {:?}", args.midi);
    let stream = midi::read_file(&args.midi)?;
    let (notes, tempo) = extract_melody(&stream);
    log::info!(
        "melody: {} events, length {}",
        notes.len(),
        format_duration(total_duration(&notes))
    );

    let notes = if simplified {
        let cfg = SimplifyConfig {
            unit_us: simplify::unit_from_tempo(tempo.final_rate(), args.denom)?,
            minimum_duration: args.min_ms,
            maximum_count: args.max_notes,
        };
        let simple = simplify::simplify(&notes, &cfg)?;
        log::info!(
            "simplified with unit {} µs: {} -> {} events",
            cfg.unit_us,
            notes.len(),
            simple.len()
        );
        simple
    } else {
        notes
    };

    emit(&notes, &out, args.format, &guard)
}

fn resimplify(args: &ResimplifyArgs) -> Result<()> {
    if args.unit_ms == Some(0) {
        return Err(ConfigError::ZeroUnit.into());
    }
    let guard = args.guard.clone().unwrap_or_else(|| guard_for(&args.out));
    check_guard(&guard)?;

    let notes = header::read_header(&args.input)?;
    log::info!("parsed {} events from {:?}", notes.len(), args.input);

    let unit_us = match args.unit_ms {
        Some(ms) => ms.saturating_mul(1_000),
        None => simplify::estimate_unit(&notes),
    };
    log::info!("using quantization unit {} µs", unit_us);

    let cfg = SimplifyConfig { unit_us, minimum_duration: args.min_ms, maximum_count: args.max_notes };
    let simple = simplify::simplify(&notes, &cfg)?;
    log::info!("simplified to {} events", simple.len());

    header::write_header(&simple, &args.out, &guard)
}

fn emit(notes: &[DurationEvent], out: &Path, format: OutputFormat, guard: &str) -> Result<()> {
    match format {
        OutputFormat::Header => header::write_header(notes, out, guard),
        OutputFormat::Binary => header::write_binary(notes, out),
    }
}

/// `dir/song.h` + `_mono` -> `dir/song_mono.h`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use midly::{
        Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
        num::{u4, u15, u24},
    };
    use midi::{Event, NoteEvent};
    use tempfile::tempdir;

    fn note(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: u4::from(0),
                message: MidiMessage::NoteOn { key: key.into(), vel: vel.into() },
            },
        }
    }

    fn end_of_track() -> TrackEvent<'static> {
        TrackEvent { delta: 0.into(), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) }
    }

    fn write_smf(path: &Path, tracks: Vec<Vec<TrackEvent<'static>>>) {
        let header = Header { format: Format::Parallel, timing: Timing::Metrical(u15::from(480)) };
        Smf { header, tracks }.save(path).unwrap();
    }

    #[test]
    fn cli_definition_is_consistent() {
        Opt::command().debug_assert();
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(with_suffix(Path::new("Core/Src/song.h"), "_mono"), PathBuf::from("Core/Src/song_mono.h"));
        assert_eq!(with_suffix(Path::new("song"), "_simple"), PathBuf::from("song_simple"));
    }

    #[test]
    fn parses_convert_flags() {
        let opt = Opt::try_parse_from([
            "midi-buzzer", "convert", "in.mid", "out.h", "--simplify", "--denom", "4", "--format", "binary",
        ])
        .unwrap();
        let Command::Convert(args) = opt.cmd else { panic!("expected convert") };
        assert!(args.simplify);
        assert_eq!(args.denom, 4);
        assert_eq!(args.min_ms, 80);
        assert_eq!(args.max_notes, 400);
        assert_eq!(args.format, OutputFormat::Binary);
    }

    #[test]
    fn chord_and_gap_through_whole_pipeline() {
        let events = [
            Event::Note(NoteEvent::start(69, 100, 0, 0)),
            Event::Note(NoteEvent::start(60, 90, 0, 1)),
            Event::Note(NoteEvent::end(60, 500, 1)),
            Event::Note(NoteEvent::end(69, 500, 0)),
            Event::Note(NoteEvent::start(69, 100, 600, 0)),
            Event::Note(NoteEvent::end(69, 900, 0)),
        ];
        let stream = EventStream { ticks_per_beat: 480, events: events.to_vec() };
        let (notes, tempo) = extract_melody(&stream);
        assert_eq!(
            notes,
            vec![DurationEvent::tone(440, 521), DurationEvent::rest(104), DurationEvent::tone(440, 313)]
        );
        assert_eq!(tempo.final_rate(), crate::tempo::DEFAULT_US_PER_BEAT);
    }

    #[test]
    fn convert_writes_simplified_header() {
        let dir = tempdir().unwrap();
        let midi_path = dir.path().join("song.mid");
        write_smf(
            &midi_path,
            vec![
                vec![
                    TrackEvent { delta: 0.into(), kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(500_000))) },
                    end_of_track(),
                ],
                vec![note(0, 69, 100), note(480, 69, 0), note(480, 81, 100), note(480, 81, 0), end_of_track()],
            ],
        );

        let args = ConvertArgs {
            midi: midi_path,
            out: dir.path().join("song.h"),
            simplify: true,
            monophonic: false,
            denom: 8,
            min_ms: 80,
            max_notes: 400,
            format: OutputFormat::Header,
            guard: None,
        };
        convert(&args).unwrap();

        let written = dir.path().join("song_simple.h");
        let text = std::fs::read_to_string(&written).unwrap();
        assert!(text.contains("#ifndef SONG_SIMPLE_H"));
        // 500 ms is exactly 8 units of 62.5 ms
        assert_eq!(
            header::parse_header(&text),
            vec![DurationEvent::tone(440, 500), DurationEvent::rest(500), DurationEvent::tone(880, 500)]
        );
    }

    #[test]
    fn convert_rejects_zero_denominator_before_reading() {
        let dir = tempdir().unwrap();
        let args = ConvertArgs {
            midi: dir.path().join("missing.mid"),
            out: dir.path().join("song.h"),
            simplify: true,
            monophonic: false,
            denom: 0,
            min_ms: 80,
            max_notes: 400,
            format: OutputFormat::Header,
            guard: None,
        };
        let err = convert(&args).unwrap_err();
        assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::ZeroDenominator));
    }

    #[test]
    fn resimplify_round_trip() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("melody.h");
        let out = dir.path().join("melody_simple.h");
        let notes = [
            DurationEvent::tone(440, 250),
            DurationEvent::tone(440, 250),
            DurationEvent::tone(880, 30),
            DurationEvent::rest(260),
        ];
        header::write_header(&notes, &input, "MELODY_H").unwrap();

        let args = ResimplifyArgs { input, out: out.clone(), unit_ms: None, min_ms: 80, max_notes: 300, guard: None };
        resimplify(&args).unwrap();

        // median 250 -> unit 125; 440 merges to 500, 880 becomes 125 (kept), rest 260 -> 250
        assert_eq!(
            header::read_header(&out).unwrap(),
            vec![DurationEvent::tone(440, 500), DurationEvent::tone(880, 125), DurationEvent::rest(250)]
        );
    }
}
