//! # Sheet Module
//!
//! The ordered note sequence a performer plays through. Only the match
//! engine flips a note to active; loading or clearing a sheet is the only
//! way back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{PracticeError, Result};
use crate::tuning::{self, Accidental};

static NEXT_NOTE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique note identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(u64);

impl NoteId {
    pub fn next() -> Self {
        NoteId(NEXT_NOTE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Written note length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteDuration {
    Whole,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
}

impl NoteDuration {
    /// Length in beats of a 4/4 measure.
    pub fn beats(self) -> f32 {
        match self {
            NoteDuration::Whole => 4.0,
            NoteDuration::Half => 2.0,
            NoteDuration::Quarter => 1.0,
            NoteDuration::Eighth => 0.5,
            NoteDuration::Sixteenth => 0.25,
        }
    }
}

/// One expected note in a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedNote {
    pub id: NoteId,
    /// Lowercase letter `a`..=`g`.
    pub pitch_class: char,
    pub octave: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accidental: Option<Accidental>,
    #[serde(default)]
    pub duration: NoteDuration,
    #[serde(default)]
    pub is_active: bool,
}

impl SequencedNote {
    pub fn new(
        pitch_class: char,
        octave: u8,
        accidental: Option<Accidental>,
        duration: NoteDuration,
    ) -> Self {
        Self {
            id: NoteId::next(),
            pitch_class: pitch_class.to_ascii_lowercase(),
            octave,
            accidental,
            duration,
            is_active: false,
        }
    }

    /// Parses a note string such as `C4` or `Bb3` into a quarter note.
    ///
    /// Only notes the classifier can report are accepted: spellings such as
    /// `E#4` or `Cb4`, and octaves outside C3-C6, fail with `InvalidFormat`.
    pub fn parse(input: &str) -> Result<Self> {
        let parsed = tuning::parse_note(input)?;
        let note = Self::new(
            parsed.letter,
            parsed.octave,
            parsed.accidental,
            NoteDuration::Quarter,
        );
        if tuning::find_note(&note.label()).is_none() {
            return Err(PracticeError::InvalidFormat(input.trim().to_string()));
        }
        Ok(note)
    }

    /// Full label as compared against detections, e.g. `C#4`, `Db4`, `C4`.
    pub fn label(&self) -> String {
        format!(
            "{}{}{}",
            self.pitch_class.to_ascii_uppercase(),
            self.accidental.map_or("", Accidental::marker),
            self.octave
        )
    }
}

/// A named sequence of notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub notes: Vec<SequencedNote>,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::default_scale()
    }
}

impl Sheet {
    pub fn new(name: impl Into<String>, notes: Vec<SequencedNote>) -> Self {
        Self {
            name: name.into(),
            notes,
        }
    }

    /// C major scale from C4 to C5 in quarter notes.
    pub fn default_scale() -> Self {
        let notes = ['c', 'd', 'e', 'f', 'g', 'a', 'b']
            .into_iter()
            .map(|letter| SequencedNote::new(letter, 4, None, NoteDuration::Quarter))
            .chain(std::iter::once(SequencedNote::new(
                'c',
                5,
                None,
                NoteDuration::Quarter,
            )))
            .collect();
        Self::new("Untitled", notes)
    }

    /// Builds a sheet from whitespace-separated note strings.
    ///
    /// Fails on the first malformed note and returns nothing partial.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let notes = text
            .split_whitespace()
            .map(SequencedNote::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name, notes))
    }

    /// Marks every note as not yet played.
    pub fn reset_progress(&mut self) {
        for note in &mut self.notes {
            note.is_active = false;
        }
    }

    /// Number of notes already matched.
    pub fn matched_count(&self) -> usize {
        self.notes.iter().filter(|n| n.is_active).count()
    }

    pub fn is_complete(&self) -> bool {
        self.notes.iter().all(|n| n.is_active)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}
