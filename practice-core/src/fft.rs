//! # Fast Fourier Transform (FFT) Module
//!
//! Turns raw audio frames into the byte magnitude spectrum the frequency
//! estimator scans. The scaling follows the usual analyser-node recipe:
//! Blackman window, magnitudes normalised by the FFT size, exponential
//! smoothing across frames, then a linear map of decibels onto 0-255.

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

use crate::config::DetectionConfig;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Blackman window in place.
fn apply_blackman_window(buffer: &mut [f32]) {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;

    let n = buffer.len() as f32;
    if n == 0.0 {
        return;
    }
    for (i, sample) in buffer.iter_mut().enumerate() {
        let x = i as f32 / n;
        let w = A0 - A1 * (2.0 * std::f32::consts::PI * x).cos()
            + A2 * (4.0 * std::f32::consts::PI * x).cos();
        *sample *= w;
    }
}

/// Stateful spectrum analyser producing byte magnitudes.
///
/// Holds the FFT plan and the previous frame's smoothed magnitudes.
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    min_decibels: f32,
    max_decibels: f32,
    smoothing: f32,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .field("smoothing", &self.smoothing)
            .finish()
    }
}

impl Analyser {
    pub fn new(fft_size: usize, min_decibels: f32, max_decibels: f32, smoothing: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            min_decibels,
            max_decibels,
            smoothing,
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.fft_size,
            config.min_decibels,
            config.max_decibels,
            config.smoothing,
        )
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins per frame (half the FFT size).
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyses one frame and returns `bin_count()` byte magnitudes.
    ///
    /// Frames shorter than the FFT size are zero-padded; extra samples are
    /// ignored.
    pub fn byte_frequency_data(&mut self, frame: &[f32]) -> Vec<u8> {
        let mut signal = vec![0.0f32; self.fft_size];
        let n = frame.len().min(self.fft_size);
        signal[..n].copy_from_slice(&frame[..n]);
        remove_dc_offset(&mut signal[..n]);
        apply_blackman_window(&mut signal);

        for (slot, &sample) in self.scratch.iter_mut().zip(signal.iter()) {
            *slot = Complex { re: sample, im: 0.0 };
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        let range = self.max_decibels - self.min_decibels;

        self.smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(prev, c)| {
                let magnitude = c.norm() * scale;
                *prev = tau * *prev + (1.0 - tau) * magnitude;
                if *prev <= 0.0 || !prev.is_finite() {
                    return 0;
                }
                let db = 20.0 * prev.log10();
                let scaled = (255.0 / range) * (db - self.min_decibels);
                scaled.floor().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Forgets smoothing history, e.g. after capture stops.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
    }
}
