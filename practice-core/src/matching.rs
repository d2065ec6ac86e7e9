//! # Matching Module
//!
//! Walks a performer through a note sequence. The expected note is always
//! the first inactive one, recomputed from the sequence on every call, and a
//! detection only ever activates that note: no skipping ahead.
//!
//! ## Features
//! - Exact and octave-free comparison of detections with the expected note
//! - Missed-note tracking for silent beats once the performer has started
//! - Per-beat outcomes for progress display

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::sheet::{NoteId, SequencedNote};
use crate::tuning::{self, NoteName};

/// How a detection is compared with the expected note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Pitch class, accidental, and octave must agree.
    #[default]
    Exact,
    /// Octave is ignored. Letter and accidental must still agree, so `C#3`
    /// satisfies an expected `C#4` or `Db5` but not a natural `C4`.
    PitchClass,
}

/// When a silent beat counts as a missed note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissPolicy {
    /// Only while detection runs and after the first successful match.
    #[default]
    AfterFirstMatch,
    /// Never record misses.
    Never,
}

/// Index of the first note not yet played, or `None` once all are active.
pub fn find_next_expected(sequence: &[SequencedNote]) -> Option<usize> {
    sequence.iter().position(|note| !note.is_active)
}

/// Whether `detected` names the note `expected`.
pub fn note_matches(expected: &SequencedNote, detected: &NoteName, mode: MatchMode) -> bool {
    match mode {
        MatchMode::Exact => detected.accepts(&expected.label()),
        MatchMode::PitchClass => {
            let marker = expected.accidental.map_or("", |a| a.marker());
            detected.spellings().iter().any(|spelling| {
                tuning::pitch_class_letter(spelling) == Some(expected.pitch_class)
                    && spelling[1..].trim_end_matches(|c: char| c.is_ascii_digit()) == marker
            })
        }
    }
}

/// Activates the expected note if `detected` matches it.
///
/// Only the first inactive note can be activated; a detection naming any
/// later note is ignored.
///
/// # Arguments
/// * `sequence` - Notes in play order
/// * `detected` - Classified note, or `None` for silence
/// * `mode` - How strictly the detection must agree with the expected note
///
/// # Returns
/// * `Some(index)` - Index of the note that was just activated
/// * `None` - Silence, a mismatch, or a sequence that is already complete
pub fn try_match(
    sequence: &mut [SequencedNote],
    detected: Option<&NoteName>,
    mode: MatchMode,
) -> Option<usize> {
    let detected = detected?;
    let index = find_next_expected(sequence)?;
    let expected = &mut sequence[index];
    if note_matches(expected, detected, mode) {
        expected.is_active = true;
        Some(index)
    } else {
        None
    }
}

/// What one beat did to the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatOutcome {
    /// The expected note was played.
    Matched(NoteId),
    /// Nothing was played for the expected note.
    Missed(NoteId),
    /// A note was heard but it was not the expected one, or a silent beat
    /// did not qualify as a miss.
    NoMatch,
    /// Every note is already active.
    Complete,
}

/// Sequence matcher with missed-note bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct MatchEngine {
    mode: MatchMode,
    miss_policy: MissPolicy,
    missed: HashSet<NoteId>,
    matched_in_session: bool,
    beats_seen: u64,
}

impl MatchEngine {
    pub fn new(mode: MatchMode, miss_policy: MissPolicy) -> Self {
        Self {
            mode,
            miss_policy,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MatchMode) {
        self.mode = mode;
    }

    /// Matches a detection against the sequence and clears the note from
    /// the missed set on success.
    pub fn try_match(
        &mut self,
        sequence: &mut [SequencedNote],
        detected: Option<&NoteName>,
    ) -> Option<NoteId> {
        let index = try_match(sequence, detected, self.mode)?;
        let id = sequence[index].id;
        self.matched_in_session = true;
        if self.missed.remove(&id) {
            tracing::debug!(note = %id, "missed note recovered");
        }
        Some(id)
    }

    /// Records the expected note as missed, if the policy allows.
    ///
    /// A miss requires running detection and at least one earlier match in
    /// this session, so silence before the performer starts is not counted.
    pub fn mark_missed(
        &mut self,
        sequence: &[SequencedNote],
        detection_running: bool,
    ) -> Option<NoteId> {
        if self.miss_policy == MissPolicy::Never || !detection_running || !self.matched_in_session
        {
            return None;
        }
        let id = sequence[find_next_expected(sequence)?].id;
        self.missed.insert(id);
        Some(id)
    }

    /// Handles one beat given the window's consensus note.
    pub fn on_beat(
        &mut self,
        sequence: &mut [SequencedNote],
        consensus: Option<&NoteName>,
        detection_running: bool,
    ) -> BeatOutcome {
        self.beats_seen += 1;
        if find_next_expected(sequence).is_none() {
            return BeatOutcome::Complete;
        }

        if consensus.is_some() {
            return match self.try_match(sequence, consensus) {
                Some(id) => BeatOutcome::Matched(id),
                None => BeatOutcome::NoMatch,
            };
        }

        match self.mark_missed(sequence, detection_running) {
            Some(id) => BeatOutcome::Missed(id),
            None => BeatOutcome::NoMatch,
        }
    }

    pub fn missed(&self) -> &HashSet<NoteId> {
        &self.missed
    }

    pub fn is_missed(&self, id: NoteId) -> bool {
        self.missed.contains(&id)
    }

    pub fn has_matched(&self) -> bool {
        self.matched_in_session
    }

    pub fn beats_seen(&self) -> u64 {
        self.beats_seen
    }

    /// Forgets misses and counters; called whenever the sequence is replaced.
    pub fn reset(&mut self) {
        self.missed.clear();
        self.matched_in_session = false;
        self.beats_seen = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::Sheet;
    use crate::tuning::find_note;

    fn seq(text: &str) -> Vec<SequencedNote> {
        Sheet::parse("test", text).unwrap().notes
    }

    fn note(label: &str) -> Option<&'static NoteName> {
        Some(find_note(label).unwrap())
    }

    #[test]
    fn next_expected_is_first_inactive() {
        let mut notes = seq("C4 D4 E4");
        assert_eq!(find_next_expected(&notes), Some(0));
        notes[0].is_active = true;
        assert_eq!(find_next_expected(&notes), Some(1));
        notes.iter_mut().for_each(|n| n.is_active = true);
        assert_eq!(find_next_expected(&notes), None);
        assert_eq!(find_next_expected(&[]), None);
    }

    #[test]
    fn out_of_order_note_is_not_matched() {
        let mut notes = seq("C4 D4");
        assert_eq!(try_match(&mut notes, note("D4"), MatchMode::Exact), None);
        assert!(notes.iter().all(|n| !n.is_active));

        assert_eq!(try_match(&mut notes, note("C4"), MatchMode::Exact), Some(0));
        assert_eq!(try_match(&mut notes, note("D4"), MatchMode::Exact), Some(1));
        assert!(notes.iter().all(|n| n.is_active));
    }

    #[test]
    fn no_detection_is_a_no_op() {
        let mut notes = seq("C4");
        assert_eq!(try_match(&mut notes, None, MatchMode::Exact), None);
        assert!(!notes[0].is_active);
    }

    #[test]
    fn enharmonic_spellings_match() {
        let mut sharp = seq("C#4");
        assert_eq!(try_match(&mut sharp, note("C#4"), MatchMode::Exact), Some(0));

        let mut flat = seq("Db4");
        assert_eq!(try_match(&mut flat, note("C#4"), MatchMode::Exact), Some(0));
    }

    #[test]
    fn octave_matters_in_exact_mode_only() {
        let mut exact = seq("C4");
        assert_eq!(try_match(&mut exact, note("C5"), MatchMode::Exact), None);

        let mut loose = seq("C4");
        assert_eq!(
            try_match(&mut loose, note("C5"), MatchMode::PitchClass),
            Some(0)
        );
    }

    #[test]
    fn pitch_class_mode_keeps_accidentals() {
        let mut notes = seq("C4");
        assert_eq!(try_match(&mut notes, note("C#3"), MatchMode::PitchClass), None);

        let mut flat = seq("Eb4");
        assert_eq!(
            try_match(&mut flat, note("D#5"), MatchMode::PitchClass),
            Some(0)
        );
    }

    #[test]
    fn complete_sequence_ignores_detections() {
        let mut notes = seq("C4");
        notes[0].is_active = true;
        assert_eq!(try_match(&mut notes, note("C4"), MatchMode::Exact), None);
    }

    #[test]
    fn silence_before_first_match_is_not_a_miss() {
        let mut engine = MatchEngine::default();
        let mut notes = seq("C4 D4");
        assert_eq!(engine.on_beat(&mut notes, None, true), BeatOutcome::NoMatch);
        assert!(engine.missed().is_empty());
    }

    #[test]
    fn missed_note_is_recorded_then_recovered() {
        let mut engine = MatchEngine::default();
        let mut notes = seq("C4 D4 E4");
        let d4 = notes[1].id;

        assert_eq!(
            engine.on_beat(&mut notes, note("C4"), true),
            BeatOutcome::Matched(notes[0].id)
        );
        assert_eq!(engine.on_beat(&mut notes, None, true), BeatOutcome::Missed(d4));
        assert!(engine.is_missed(d4));

        assert_eq!(
            engine.on_beat(&mut notes, note("D4"), true),
            BeatOutcome::Matched(d4)
        );
        assert!(!engine.is_missed(d4));
        assert!(notes[1].is_active);
    }

    #[test]
    fn misses_need_running_detection() {
        let mut engine = MatchEngine::default();
        let mut notes = seq("C4 D4");
        engine.try_match(&mut notes, note("C4"));
        assert_eq!(engine.on_beat(&mut notes, None, false), BeatOutcome::NoMatch);
        assert!(engine.missed().is_empty());
    }

    #[test]
    fn never_policy_records_nothing() {
        let mut engine = MatchEngine::new(MatchMode::Exact, MissPolicy::Never);
        let mut notes = seq("C4 D4");
        engine.try_match(&mut notes, note("C4"));
        assert_eq!(engine.on_beat(&mut notes, None, true), BeatOutcome::NoMatch);
    }

    #[test]
    fn wrong_note_is_not_a_miss() {
        let mut engine = MatchEngine::default();
        let mut notes = seq("C4 D4");
        engine.try_match(&mut notes, note("C4"));
        assert_eq!(
            engine.on_beat(&mut notes, note("G4"), true),
            BeatOutcome::NoMatch
        );
        assert!(engine.missed().is_empty());
    }

    #[test]
    fn finished_sequence_reports_complete() {
        let mut engine = MatchEngine::default();
        let mut notes = seq("C4");
        engine.try_match(&mut notes, note("C4"));
        assert_eq!(engine.on_beat(&mut notes, None, true), BeatOutcome::Complete);
        assert!(engine.missed().is_empty());
    }

    #[test]
    fn reset_clears_misses_and_counters() {
        let mut engine = MatchEngine::default();
        let mut notes = seq("C4 D4");
        engine.try_match(&mut notes, note("C4"));
        engine.on_beat(&mut notes, None, true);
        assert_eq!(engine.missed().len(), 1);

        engine.reset();
        assert!(engine.missed().is_empty());
        assert!(!engine.has_matched());
        assert_eq!(engine.beats_seen(), 0);
    }
}
