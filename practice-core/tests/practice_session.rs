//! End-to-end checks of the practice pipeline with synthetic audio.

use practice_core::Config;
use practice_core::matching::BeatOutcome;
use practice_core::metronome::{Beat, BeatClock, Tempo};
use practice_core::session::{MatchTiming, PracticeSession};
use practice_core::sheet::Sheet;
use std::time::{Duration, Instant};

const SAMPLE_RATE: u32 = 44100;
const FRAME: usize = 2048;

/// A quiet sine frame; loud enough to clear the noise floor without
/// saturating neighbouring bins.
fn tone(freq: f32) -> Vec<f32> {
    (0..FRAME)
        .map(|i| {
            0.02 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin()
        })
        .collect()
}

fn silence() -> Vec<f32> {
    vec![0.0; FRAME]
}

fn unsmoothed_config() -> Config {
    let mut config = Config::default();
    config.detection.smoothing = 0.0;
    config
}

fn beat(count: u64) -> Beat {
    Beat {
        index: (count % 4) as u8,
        count,
    }
}

#[test]
fn synthetic_tones_are_classified() {
    let mut session = PracticeSession::new(
        &unsmoothed_config(),
        Sheet::parse("scale", "C4 D4 E4").unwrap(),
        MatchTiming::OnBeat,
    );
    session.detection_started(SAMPLE_RATE);

    for (freq, label) in [(261.63, "C4"), (293.66, "D4"), (329.63, "E4")] {
        let sample = session.process_frame(&tone(freq)).unwrap();
        assert_eq!(sample.note.map(|n| n.primary()), Some(label), "{freq} Hz");
        assert!(session.detector().signal_strength() > 0.0);
    }
}

#[test]
fn beat_synchronised_scale_is_followed() {
    let mut session = PracticeSession::new(
        &unsmoothed_config(),
        Sheet::parse("scale", "C4 D4 E4").unwrap(),
        MatchTiming::OnBeat,
    );
    session.detection_started(SAMPLE_RATE);
    let ids: Vec<_> = session.sheet().notes.iter().map(|n| n.id).collect();

    // Beat 0: C4 held for three frames.
    for _ in 0..3 {
        session.process_frame(&tone(261.63));
    }
    assert_eq!(session.on_beat(beat(0)), BeatOutcome::Matched(ids[0]));

    // Beat 1: silence after the performer started counts as a miss.
    for _ in 0..3 {
        session.process_frame(&silence());
    }
    assert_eq!(session.on_beat(beat(1)), BeatOutcome::Missed(ids[1]));
    assert_eq!(session.progress().missed, 1);

    // Beat 2: a single stray frame is not enough.
    session.process_frame(&tone(293.66));
    session.process_frame(&silence());
    assert_eq!(session.on_beat(beat(2)), BeatOutcome::Missed(ids[1]));

    // Beat 3: D4 is played late and leaves the missed set.
    for _ in 0..2 {
        session.process_frame(&tone(293.66));
    }
    assert_eq!(session.on_beat(beat(3)), BeatOutcome::Matched(ids[1]));
    assert_eq!(session.progress().missed, 0);

    for _ in 0..2 {
        session.process_frame(&tone(329.63));
    }
    assert_eq!(session.on_beat(beat(4)), BeatOutcome::Matched(ids[2]));
    assert!(session.progress().is_complete());
    assert_eq!(session.on_beat(beat(5)), BeatOutcome::Complete);
}

#[test]
fn samples_do_not_carry_over_between_beats() {
    let mut session = PracticeSession::new(
        &unsmoothed_config(),
        Sheet::parse("one", "C4 C4").unwrap(),
        MatchTiming::OnBeat,
    );
    session.detection_started(SAMPLE_RATE);

    session.process_frame(&tone(261.63));
    session.process_frame(&tone(261.63));
    assert!(matches!(session.on_beat(beat(0)), BeatOutcome::Matched(_)));

    // The window was cleared, so one more frame cannot form a consensus.
    session.process_frame(&tone(261.63));
    assert!(!matches!(session.on_beat(beat(1)), BeatOutcome::Matched(_)));
    assert_eq!(session.progress().matched, 1);
}

#[test]
fn continuous_mode_matches_per_frame() {
    let mut session = PracticeSession::new(
        &unsmoothed_config(),
        Sheet::parse("pair", "E4 G4").unwrap(),
        MatchTiming::Continuous,
    );
    session.detection_started(SAMPLE_RATE);

    session.process_frame(&tone(392.0));
    assert_eq!(session.progress().matched, 0);
    session.process_frame(&tone(329.63));
    assert_eq!(session.progress().matched, 1);
    session.process_frame(&tone(392.0));
    assert!(session.progress().is_complete());
}

#[test]
fn stopping_detection_clears_readings() {
    let mut session = PracticeSession::new(
        &unsmoothed_config(),
        Sheet::default_scale(),
        MatchTiming::OnBeat,
    );
    session.detection_started(SAMPLE_RATE);
    session.process_frame(&tone(261.63));
    assert!(session.detector().detected_note().is_some());

    session.detection_stopped();
    assert_eq!(session.detector().detected_note(), None);
    assert_eq!(session.detector().signal_strength(), 0.0);
    assert_eq!(session.process_frame(&tone(261.63)), None);
}

#[test]
fn smoothed_analyser_settles_on_held_note() {
    let mut session = PracticeSession::new(
        &Config::default(),
        Sheet::parse("a", "A4").unwrap(),
        MatchTiming::OnBeat,
    );
    session.detection_started(SAMPLE_RATE);
    for _ in 0..6 {
        session.process_frame(&tone(440.0));
    }
    assert!(matches!(session.on_beat(beat(0)), BeatOutcome::Matched(_)));
}

#[test]
fn beat_clock_drives_session_over_channel() {
    let mut session = PracticeSession::new(
        &unsmoothed_config(),
        Sheet::parse("two", "C4 D4").unwrap(),
        MatchTiming::OnBeat,
    );
    session.detection_started(SAMPLE_RATE);

    let mut clock = BeatClock::new(Tempo::new(208).unwrap());
    let beats = clock.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    let melody = [261.63, 293.66];
    let mut outcomes = Vec::new();

    // Single-threaded loop: frames are produced between beats, as capture would.
    while !session.progress().is_complete() && Instant::now() < deadline {
        let next = melody[session.progress().matched.min(melody.len() - 1)];
        session.process_frame(&tone(next));
        if let Ok(beat) = beats.recv_timeout(Duration::from_millis(20)) {
            outcomes.push(session.on_beat(beat));
        }
    }
    clock.stop();

    assert!(session.progress().is_complete(), "outcomes: {outcomes:?}");
    assert_eq!(session.progress().missed, 0);
}
