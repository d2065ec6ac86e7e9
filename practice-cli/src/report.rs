//! Progress output for the terminal.

use practice_core::PitchSample;
use practice_core::matching::BeatOutcome;
use practice_core::metronome::Beat;
use practice_core::session::PracticeSession;
use practice_core::sheet::{NoteId, Sheet};
use std::collections::HashMap;

/// Logs changes in what is heard and how the sheet is progressing.
pub struct Reporter {
    labels: HashMap<NoteId, String>,
    last_heard: Option<String>,
    last_matched: usize,
}

impl Reporter {
    pub fn new(sheet: &Sheet) -> Self {
        let labels = sheet.notes.iter().map(|n| (n.id, n.label())).collect();
        let sequence: Vec<String> = sheet.notes.iter().map(|n| n.label()).collect();
        tracing::info!("sheet \"{}\": {}", sheet.name, sequence.join(" "));
        Self {
            labels,
            last_heard: None,
            last_matched: 0,
        }
    }

    fn label(&self, id: NoteId) -> &str {
        self.labels.get(&id).map_or("?", String::as_str)
    }

    pub fn on_sample(&mut self, sample: Option<PitchSample>, session: &PracticeSession) {
        let heard = sample.and_then(|s| s.note).map(|n| n.to_string());
        if heard != self.last_heard {
            if let Some(note) = &heard {
                tracing::info!(
                    strength = session.detector().signal_strength().round(),
                    "hearing {note}"
                );
            }
            self.last_heard = heard;
        }

        // Continuous matching advances on frames rather than beats.
        let matched = session.progress().matched;
        if matched > self.last_matched {
            self.report_progress(session);
        }
    }

    pub fn on_beat(&mut self, beat: Beat, outcome: BeatOutcome, session: &PracticeSession) {
        let tick = if beat.is_downbeat() { "TICK" } else { "tick" };
        match outcome {
            BeatOutcome::Matched(id) => {
                tracing::info!("{tick} {} ✓", self.label(id));
                self.report_progress(session);
            }
            BeatOutcome::Missed(id) => tracing::info!("{tick} {} missed", self.label(id)),
            BeatOutcome::NoMatch => tracing::debug!("{tick}"),
            BeatOutcome::Complete => {}
        }
    }

    fn report_progress(&mut self, session: &PracticeSession) {
        let progress = session.progress();
        self.last_matched = progress.matched;
        match progress.expected {
            Some(index) => tracing::info!(
                "{}/{} played, next {}",
                progress.matched,
                progress.total,
                session.sheet().notes[index].label()
            ),
            None => tracing::info!("{}/{} played, sheet complete", progress.matched, progress.total),
        }
    }

    pub fn summary(&self, session: &PracticeSession) {
        let progress = session.progress();
        let missed: Vec<&str> = session
            .sheet()
            .notes
            .iter()
            .filter(|n| session.engine().is_missed(n.id))
            .map(|n| self.label(n.id))
            .collect();
        tracing::info!(
            matched = progress.matched,
            total = progress.total,
            beats = session.engine().beats_seen(),
            "practice finished"
        );
        if !missed.is_empty() {
            tracing::info!("still missed: {}", missed.join(" "));
        }
    }
}
