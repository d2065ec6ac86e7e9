//! # Practice Session Module
//!
//! Ties detection and matching to one sheet on a single timeline. Frames and
//! beats arrive in whatever order the caller's loop receives them; a beat
//! only consumes the samples recorded before it, then empties the window.
//!
//! The session is the only writer of the sheet's `is_active` flags.

use crate::PitchSample;
use crate::config::Config;
use crate::detector::NoteDetector;
use crate::matching::{BeatOutcome, MatchEngine};
use crate::metronome::Beat;
use crate::sheet::Sheet;

/// When detections are compared with the sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchTiming {
    /// Once per beat, using the window's consensus note.
    #[default]
    OnBeat,
    /// On every frame, using that frame's note directly.
    Continuous,
}

/// Snapshot of how far the performer has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub matched: usize,
    pub total: usize,
    pub missed: usize,
    /// Index of the note expected next.
    pub expected: Option<usize>,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.expected.is_none()
    }
}

#[derive(Debug)]
pub struct PracticeSession {
    sheet: Sheet,
    detector: NoteDetector,
    engine: MatchEngine,
    timing: MatchTiming,
}

impl PracticeSession {
    pub fn new(config: &Config, sheet: Sheet, timing: MatchTiming) -> Self {
        Self {
            sheet,
            detector: NoteDetector::new(&config.detection),
            engine: MatchEngine::new(config.matching.mode, config.matching.miss_policy),
            timing,
        }
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    pub fn detector(&self) -> &NoteDetector {
        &self.detector
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    pub fn timing(&self) -> MatchTiming {
        self.timing
    }

    /// Replaces the sheet and resets all matching state.
    pub fn load_sheet(&mut self, sheet: Sheet) {
        tracing::info!(name = %sheet.name, notes = sheet.len(), "sheet loaded");
        self.sheet = sheet;
        self.engine.reset();
        self.detector.clear_samples();
    }

    /// Marks every note unplayed and forgets misses.
    pub fn restart(&mut self) {
        self.sheet.reset_progress();
        self.engine.reset();
        self.detector.clear_samples();
    }

    /// Call once a capture session is delivering frames.
    pub fn detection_started(&mut self, sample_rate: u32) {
        self.detector.start(sample_rate);
    }

    /// Call when capture stops; detected note and strength go back to neutral.
    pub fn detection_stopped(&mut self) {
        self.detector.stop();
    }

    /// Analyses one captured frame.
    pub fn process_frame(&mut self, frame: &[f32]) -> Option<PitchSample> {
        let sample = self.detector.process_frame(frame)?;
        if self.timing == MatchTiming::Continuous {
            if let Some(id) = self.engine.try_match(&mut self.sheet.notes, sample.note) {
                tracing::info!(note = %id, "note matched");
            }
        }
        Some(sample)
    }

    /// Settles one beat against the samples gathered since the last one.
    pub fn on_beat(&mut self, beat: Beat) -> BeatOutcome {
        if self.timing == MatchTiming::Continuous {
            return if self.progress().is_complete() {
                BeatOutcome::Complete
            } else {
                BeatOutcome::NoMatch
            };
        }

        let running = self.detector.is_running();
        let consensus = if running {
            self.detector.consensus()
        } else {
            None
        };
        let outcome = self
            .engine
            .on_beat(&mut self.sheet.notes, consensus, running);
        self.detector.clear_samples();

        tracing::debug!(
            beat = beat.index,
            consensus = consensus.map(|n| n.primary()),
            ?outcome,
            "beat settled"
        );
        outcome
    }

    pub fn progress(&self) -> Progress {
        Progress {
            matched: self.sheet.matched_count(),
            total: self.sheet.len(),
            missed: self.engine.missed().len(),
            expected: crate::matching::find_next_expected(&self.sheet.notes),
        }
    }
}
