//! # Configuration Module
//!
//! Tunable constants for detection, the metronome, and note matching.
//! Every section falls back to its defaults, so a config file only needs
//! the fields it wants to change.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PracticeError, Result};
use crate::matching::{MatchMode, MissPolicy};
use crate::metronome::{MAX_BPM, MIN_BPM};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub metronome: MetronomeConfig,
    pub matching: MatchingConfig,
}

/// Analyser, estimator, classifier, and sample window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Samples per analysis frame. Must be a power of two.
    pub fft_size: usize,
    /// Minimum byte magnitude (0-255) for a bin to count as signal.
    pub noise_floor: u8,
    /// Largest distance in Hz from a table entry that still classifies.
    pub tolerance_hz: f32,
    /// Number of recent samples kept for consensus.
    pub window_capacity: usize,
    /// Occurrences a note needs inside the window to become the consensus.
    pub consensus_min_count: usize,
    /// Decibel level mapped to byte value 0.
    pub min_decibels: f32,
    /// Decibel level mapped to byte value 255.
    pub max_decibels: f32,
    /// Exponential smoothing between consecutive spectra (0 = none).
    pub smoothing: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            noise_floor: 130,
            tolerance_hz: 10.0,
            window_capacity: 4,
            consensus_min_count: 2,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing: 0.8,
        }
    }
}

/// Beat clock and click settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub tempo_bpm: u32,
    /// Play an audible click on each beat.
    pub click: bool,
    /// Click pitch on the downbeat.
    pub accent_hz: f32,
    /// Click pitch on the other beats.
    pub beat_hz: f32,
    pub click_volume: f32,
    pub click_ms: u32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: 80,
            click: true,
            accent_hz: 1000.0,
            beat_hz: 800.0,
            click_volume: 0.5,
            click_ms: 100,
        }
    }
}

/// Match engine behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub mode: MatchMode,
    pub miss_policy: MissPolicy,
}

impl Config {
    /// Reads and validates a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        tracing::info!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Checks value ranges that would break the pipeline.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if d.fft_size < 32 || !d.fft_size.is_power_of_two() {
            return Err(PracticeError::Config(format!(
                "fft_size must be a power of two >= 32, got {}",
                d.fft_size
            )));
        }
        if !(d.tolerance_hz.is_finite() && d.tolerance_hz > 0.0) {
            return Err(PracticeError::Config(
                "tolerance_hz must be positive".to_string(),
            ));
        }
        if d.window_capacity == 0 {
            return Err(PracticeError::Config(
                "window_capacity must be at least 1".to_string(),
            ));
        }
        if d.consensus_min_count == 0 || d.consensus_min_count > d.window_capacity {
            return Err(PracticeError::Config(format!(
                "consensus_min_count must be in 1..={}",
                d.window_capacity
            )));
        }
        if d.min_decibels >= d.max_decibels {
            return Err(PracticeError::Config(
                "min_decibels must be below max_decibels".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&d.smoothing) {
            return Err(PracticeError::Config(
                "smoothing must be in [0, 1)".to_string(),
            ));
        }

        let m = &self.metronome;
        if !(MIN_BPM..=MAX_BPM).contains(&m.tempo_bpm) {
            return Err(PracticeError::TempoOutOfRange {
                bpm: m.tempo_bpm,
                min: MIN_BPM,
                max: MAX_BPM,
            });
        }
        if !(0.0..=1.0).contains(&m.click_volume) {
            return Err(PracticeError::Config(
                "click_volume must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
