//! # Practice - Sight-Reading Trainer
//!
//! Terminal front end for the practice core. Listens to the microphone,
//! ticks a metronome, and reports each note of the sheet as it is played.
//!
//! ## Architecture
//! - **Audio Thread**: microphone capture, owned by `CaptureSession`
//! - **Timer Thread**: beat clock ticks
//! - **Click Thread**: optional audible click output
//! - **Main Thread**: one `select!` loop that feeds frames and beats to the
//!   practice session in arrival order

mod report;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, select};
use practice_core::audio::CaptureSession;
use practice_core::click::ClickPlayer;
use practice_core::matching::MatchMode;
use practice_core::metronome::{Beat, BeatClock, Tempo};
use practice_core::session::{MatchTiming, PracticeSession};
use practice_core::sheet::Sheet;
use practice_core::{Config, PracticeError};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use report::Reporter;

/// Play through a note sequence in time with a metronome.
#[derive(Parser, Debug)]
#[command(name = "practice")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tempo in beats per minute (40-208)
    #[arg(short, long)]
    tempo: Option<u32>,

    /// Notes to play, e.g. "C4 D4 E4 F#4" (default: C major scale)
    #[arg(short, long)]
    notes: Option<String>,

    /// Match pitch class only, ignoring the octave
    #[arg(long)]
    pitch_class: bool,

    /// Keep the metronome silent
    #[arg(long)]
    no_click: bool,

    /// Match every detected note immediately instead of once per beat
    #[arg(long)]
    no_metronome: bool,

    /// Give up if the microphone is not available within this many seconds
    #[arg(long)]
    mic_timeout: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Log every beat decision
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = build_config(&args)?;
    let sheet = match &args.notes {
        Some(text) => Sheet::parse("Command line", text).context("could not read --notes")?,
        None => Sheet::default_scale(),
    };
    let timing = if args.no_metronome {
        MatchTiming::Continuous
    } else {
        MatchTiming::OnBeat
    };

    tracing::info!(
        notes = sheet.len(),
        tempo = config.metronome.tempo_bpm,
        ?timing,
        "starting practice"
    );
    let mut session = PracticeSession::new(&config, sheet, timing);

    let started = match args.mic_timeout {
        Some(secs) => {
            CaptureSession::start_with_timeout(config.detection.fft_size, Duration::from_secs(secs))
        }
        None => CaptureSession::start(config.detection.fft_size),
    };
    let mut capture = match started {
        Ok(capture) => capture,
        Err(PracticeError::PermissionDenied) => {
            anyhow::bail!("microphone access was denied; allow it in your system settings")
        }
        Err(e) => return Err(e).context("could not start the microphone"),
    };
    session.detection_started(capture.sample_rate());

    let tempo = Tempo::new(config.metronome.tempo_bpm)?;
    let mut clock = BeatClock::new(tempo);
    let beats = match timing {
        MatchTiming::OnBeat => {
            tracing::info!(bpm = tempo.bpm(), marking = tempo.marking(), "metronome");
            clock.start().context("could not start the metronome")?
        }
        MatchTiming::Continuous => crossbeam_channel::never(),
    };

    let click = if config.metronome.click && timing == MatchTiming::OnBeat {
        match ClickPlayer::start(&config.metronome) {
            Ok(player) => Some(player),
            Err(e) => {
                tracing::warn!(error = %e, "metronome click disabled");
                None
            }
        }
    } else {
        None
    };

    let deadline = match args.seconds {
        Some(secs) => crossbeam_channel::at(Instant::now() + Duration::from_secs(secs)),
        None => crossbeam_channel::never(),
    };

    let frames = capture.frames().clone();
    let mut reporter = Reporter::new(session.sheet());
    run_loop(
        &mut session,
        &frames,
        &beats,
        &deadline,
        click.as_ref(),
        &mut reporter,
    );

    clock.stop();
    drop(click);
    capture.stop();
    session.detection_stopped();

    reporter.summary(&session);
    Ok(())
}

/// Single-threaded event loop: frames and beats are handled in arrival order.
fn run_loop(
    session: &mut PracticeSession,
    frames: &Receiver<Vec<f32>>,
    beats: &Receiver<Beat>,
    deadline: &Receiver<Instant>,
    click: Option<&ClickPlayer>,
    reporter: &mut Reporter,
) {
    while !session.progress().is_complete() {
        select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => {
                    let sample = session.process_frame(&frame);
                    reporter.on_sample(sample, session);
                }
                Err(_) => {
                    tracing::warn!("microphone stream ended");
                    break;
                }
            },
            recv(beats) -> msg => match msg {
                Ok(beat) => {
                    if let Some(player) = click {
                        player.play(beat);
                    }
                    let outcome = session.on_beat(beat);
                    reporter.on_beat(beat, outcome, session);
                }
                Err(_) => {
                    tracing::warn!("metronome stopped unexpectedly");
                    break;
                }
            },
            recv(deadline) -> _ => {
                tracing::info!("time is up");
                break;
            },
        }
    }
}

fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("could not load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(bpm) = args.tempo {
        config.metronome.tempo_bpm = Tempo::new(bpm)?.bpm();
    }
    if args.pitch_class {
        config.matching.mode = MatchMode::PitchClass;
    }
    if args.no_click {
        config.metronome.click = false;
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from(["practice", "--tempo", "120", "--pitch-class", "--no-click"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.metronome.tempo_bpm, 120);
        assert_eq!(config.matching.mode, MatchMode::PitchClass);
        assert!(!config.metronome.click);
    }

    #[test]
    fn mic_timeout_is_optional() {
        assert_eq!(Args::parse_from(["practice"]).mic_timeout, None);
        let args = Args::parse_from(["practice", "--mic-timeout", "5"]);
        assert_eq!(args.mic_timeout, Some(5));
    }

    #[test]
    fn out_of_range_tempo_is_rejected() {
        let args = Args::parse_from(["practice", "--tempo", "300"]);
        let err = build_config(&args).unwrap_err();
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let args = Args::parse_from(["practice", "--config", "/nonexistent/practice.json"]);
        let err = build_config(&args).unwrap_err();
        assert!(err.to_string().contains("could not load config"));
    }
}
