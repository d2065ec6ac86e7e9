//! # Error Module
//!
//! Error taxonomy for the practice core. Audio and timer acquisition failures
//! surface here so the front end can report them and disable the affected
//! feature; nothing in the detection or matching pipeline returns an error
//! for ordinary conditions like silence or a finished sequence.

use thiserror::Error;

/// Result type used throughout the practice core.
pub type Result<T> = std::result::Result<T, PracticeError>;

/// Errors surfaced by capture, metronome, configuration, and note parsing.
#[derive(Debug, Error)]
pub enum PracticeError {
    /// The user or the platform refused microphone access.
    #[error("microphone access was denied")]
    PermissionDenied,

    /// An audio device, stream, or timer could not be created.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Another capture session already owns the input stream.
    #[error("a capture session is already active")]
    CaptureBusy,

    /// Tempo outside the supported slider range.
    #[error("tempo {bpm} BPM is outside the supported range {min}..={max}")]
    TempoOutOfRange {
        /// The rejected tempo.
        bpm: u32,
        /// Lowest accepted tempo.
        min: u32,
        /// Highest accepted tempo.
        max: u32,
    },

    /// A note string could not be parsed.
    #[error("invalid note format: {0}")]
    InvalidFormat(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while reading configuration or sheets.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PracticeError {
    pub(crate) fn unavailable(msg: impl std::fmt::Display) -> Self {
        PracticeError::ResourceUnavailable(msg.to_string())
    }
}
