// practice-core/src/lib.rs

//! The core logic for the sight-reading practice tool.
//! This crate listens to a microphone, works out which note is being
//! played, and checks it beat by beat against a written sequence. It is
//! completely headless and contains no UI code.

pub mod audio;
pub mod click;
pub mod config;
pub mod detector;
pub mod error;
pub mod fft;
pub mod matching;
pub mod metronome;
pub mod pitch;
pub mod sampling;
pub mod session;
pub mod sheet;
pub mod tuning;

pub use config::Config;
pub use error::{PracticeError, Result};

use tuning::NoteName;

/// The result of analysing a single audio frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Dominant frequency in Hz, or `0.0` when nothing was detected.
    pub frequency: f32,
    /// Nearest note, if the frequency is close enough to one.
    pub note: Option<&'static NoteName>,
}
