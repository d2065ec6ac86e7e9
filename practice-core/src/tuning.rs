//! # Musical Tuning Module
//!
//! Note lookup for the classifier: a fixed equal-temperament table from C3 to
//! C6 (A4 = 440 Hz), nearest-note classification with a tolerance, and
//! parsing of typed note strings.
//!
//! Each table entry is a frequency bucket carrying every spelling that names
//! it, so a black key is both `C#4` and `Db4` without string splitting.
//!
//! ## Features
//! - 37-entry note table with sharp and flat spellings
//! - Nearest-note classification within a tolerance
//! - Cents deviation from a target frequency
//! - Note string parsing (`C4`, `f#3`, `Bb5`)

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PracticeError, Result};

/// Reference pitch for A4.
pub const A4_FREQUENCY: f32 = 440.0;

/// Number of table entries: C3 through C6 inclusive.
pub const TABLE_SIZE: usize = 37;

/// Semitones from A4 down to C3.
const C3_OFFSET_FROM_A4: i32 = -21;

/// A frequency bucket in the note table.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteName {
    spellings: Vec<String>,
    frequency: f32,
}

impl NoteName {
    /// The sharp (or natural) spelling, e.g. `C#4`.
    pub fn primary(&self) -> &str {
        &self.spellings[0]
    }

    /// All spellings for this bucket, sharp first.
    pub fn spellings(&self) -> &[String] {
        &self.spellings
    }

    /// Whether `label` is one of this bucket's spellings.
    pub fn accepts(&self, label: &str) -> bool {
        self.spellings.iter().any(|s| s == label)
    }

    /// Equal-tempered frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Lowercase pitch class letter of the primary spelling.
    pub fn letter(&self) -> char {
        // Table spellings always start with an uppercase letter A-G.
        self.spellings[0]
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('c')
    }

    /// Deviation of `freq` from this bucket in cents.
    pub fn cents_from(&self, freq: f32) -> f32 {
        calculate_cents_deviation(freq, self.frequency)
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spellings.join("/"))
    }
}

/// Statically computed table from C3 to C6.
static NOTES: Lazy<Vec<NoteName>> = Lazy::new(|| {
    const SHARPS: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    const FLATS: [&str; 12] = [
        "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
    ];
    let mut notes = Vec::with_capacity(TABLE_SIZE);

    for i in 0..TABLE_SIZE {
        let semitones = i as i32 + C3_OFFSET_FROM_A4;
        let frequency = A4_FREQUENCY * 2.0_f32.powf(semitones as f32 / 12.0);

        let class = i % 12;
        let octave = 3 + i / 12;
        let mut spellings = vec![format!("{}{}", SHARPS[class], octave)];
        if FLATS[class] != SHARPS[class] {
            spellings.push(format!("{}{}", FLATS[class], octave));
        }

        notes.push(NoteName {
            spellings,
            frequency,
        });
    }
    notes
});

/// Spelling to table index.
static NOTE_MAP: Lazy<BTreeMap<String, usize>> = Lazy::new(|| {
    NOTES
        .iter()
        .enumerate()
        .flat_map(|(i, note)| note.spellings.iter().map(move |s| (s.clone(), i)))
        .collect()
});

/// The full note table, ascending.
pub fn notes() -> &'static [NoteName] {
    &NOTES
}

/// Looks up a table entry by any of its spellings.
pub fn find_note(label: &str) -> Option<&'static NoteName> {
    NOTE_MAP.get(label).map(|&i| &NOTES[i])
}

/// Finds the table entry nearest to `freq`.
///
/// # Arguments
/// * `freq` - Estimated frequency in Hz
/// * `tolerance_hz` - Largest accepted distance to the nearest entry
///
/// # Returns
/// * `Some(note)` - Nearest entry; on an exact tie the lower one wins
/// * `None` - `freq` is non-positive or non-finite (checked before any table
///   scan), or the nearest entry is more than `tolerance_hz` away
pub fn classify(freq: f32, tolerance_hz: f32) -> Option<&'static NoteName> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }

    let mut closest: Option<(&NoteName, f32)> = None;
    for note in NOTES.iter() {
        let diff = (note.frequency - freq).abs();
        match closest {
            Some((_, best)) if diff >= best => {}
            _ => closest = Some((note, diff)),
        }
    }

    match closest {
        Some((note, diff)) if diff <= tolerance_hz => Some(note),
        _ => None,
    }
}

/// Extracts the lowercase pitch class letter (`a`..=`g`) from a note label,
/// ignoring accidental and octave.
pub fn pitch_class_letter(label: &str) -> Option<char> {
    let first = label.chars().next()?.to_ascii_lowercase();
    ('a'..='g').contains(&first).then_some(first)
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents make a semitone; positive values are sharp.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Accidental attached to a written note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accidental {
    Sharp,
    Flat,
    Natural,
}

impl Accidental {
    /// The marker used inside a note label. Naturals are unmarked.
    pub fn marker(self) -> &'static str {
        match self {
            Accidental::Sharp => "#",
            Accidental::Flat => "b",
            Accidental::Natural => "",
        }
    }
}

/// A typed note string broken into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedNote {
    /// Lowercase letter `a`..=`g`.
    pub letter: char,
    pub accidental: Option<Accidental>,
    pub octave: u8,
}

/// Parses strings like `C4`, `f#3`, or `Bb5`.
///
/// The format is a letter A-G (either case), an optional `#` or `b`, and a
/// single octave digit.
pub fn parse_note(input: &str) -> Result<ParsedNote> {
    let invalid = || PracticeError::InvalidFormat(input.to_string());
    let mut chars = input.trim().chars();

    let letter = chars
        .next()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| ('a'..='g').contains(c))
        .ok_or_else(invalid)?;

    let rest: Vec<char> = chars.collect();
    let (accidental, digits) = match rest.as_slice() {
        ['#', tail @ ..] => (Some(Accidental::Sharp), tail),
        ['b', tail @ ..] => (Some(Accidental::Flat), tail),
        tail => (None, tail),
    };

    let octave = match digits {
        [d] => d.to_digit(10).ok_or_else(invalid)? as u8,
        _ => return Err(invalid()),
    };

    Ok(ParsedNote {
        letter,
        accidental,
        octave,
    })
}
