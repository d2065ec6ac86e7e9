//! # Note Detector Module
//!
//! Per-frame pipeline: analyser → dominant frequency → nearest note → sample
//! window. Holds the latest reading for display and the window the beat
//! handler reads a consensus from.

use crate::PitchSample;
use crate::config::DetectionConfig;
use crate::fft::Analyser;
use crate::pitch;
use crate::sampling::SampleWindow;
use crate::tuning::{self, NoteName};

#[derive(Debug)]
pub struct NoteDetector {
    analyser: Analyser,
    window: SampleWindow,
    noise_floor: u8,
    tolerance_hz: f32,
    sample_rate: Option<u32>,
    last: Option<PitchSample>,
}

impl NoteDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            analyser: Analyser::from_config(config),
            window: SampleWindow::new(config.window_capacity, config.consensus_min_count),
            noise_floor: config.noise_floor,
            tolerance_hz: config.tolerance_hz,
            sample_rate: None,
            last: None,
        }
    }

    /// Marks detection as running at `sample_rate`.
    pub fn start(&mut self, sample_rate: u32) {
        self.reset();
        self.sample_rate = Some(sample_rate);
    }

    /// Marks detection as stopped and clears every reading.
    pub fn stop(&mut self) {
        self.reset();
        self.sample_rate = None;
    }

    pub fn is_running(&self) -> bool {
        self.sample_rate.is_some()
    }

    pub fn fft_size(&self) -> usize {
        self.analyser.fft_size()
    }

    /// Analyses one captured frame and records the result in the window.
    ///
    /// Returns `None` when detection is not running.
    pub fn process_frame(&mut self, frame: &[f32]) -> Option<PitchSample> {
        let sample_rate = self.sample_rate?;
        let bins = self.analyser.byte_frequency_data(frame);
        let sample = self.process_spectrum(&bins, sample_rate);
        Some(sample)
    }

    /// Estimates and classifies a ready-made byte spectrum.
    pub fn process_spectrum(&mut self, bins: &[u8], sample_rate: u32) -> PitchSample {
        let frequency = pitch::estimate_frequency(bins, sample_rate, self.noise_floor);
        let note = tuning::classify(frequency, self.tolerance_hz);
        if let Some(n) = note {
            tracing::trace!(
                frequency,
                note = %n,
                cents = n.cents_from(frequency),
                "frame classified"
            );
        }

        let sample = PitchSample { frequency, note };
        self.window.add_sample(sample);
        self.last = Some(sample);
        sample
    }

    /// Note detected in the latest frame.
    pub fn detected_note(&self) -> Option<&'static NoteName> {
        self.last.and_then(|s| s.note)
    }

    /// Meter value (0-100) for the latest frame.
    pub fn signal_strength(&self) -> f32 {
        self.last.map_or(0.0, |s| pitch::signal_strength(s.frequency))
    }

    pub fn last_sample(&self) -> Option<PitchSample> {
        self.last
    }

    pub fn consensus(&self) -> Option<&'static NoteName> {
        self.window.consensus_note()
    }

    pub fn clear_samples(&mut self) {
        self.window.clear_samples();
    }

    /// Returns every reading to neutral.
    pub fn reset(&mut self) {
        self.window.clear_samples();
        self.analyser.reset();
        self.last = None;
    }
}
