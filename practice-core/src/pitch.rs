//! # Pitch Detection Module
//!
//! Dominant-frequency estimation over a byte magnitude spectrum, as produced
//! by [`crate::fft::Analyser`]. The loudest bin wins; anything quieter than
//! the noise floor reads as silence.
//!
//! ## Features
//! - Loudest-bin frequency estimate with a noise floor
//! - Signal strength meter value for display

/// Default noise floor on the 0-255 magnitude scale.
pub const DEFAULT_NOISE_FLOOR: u8 = 130;

/// Returns the frequency in Hz of the loudest bin in `bins`.
///
/// # Arguments
/// * `bins` - `fft_size / 2` byte magnitudes covering 0 Hz up to Nyquist
/// * `sample_rate` - Capture sample rate in Hz
/// * `noise_floor` - Peaks below this magnitude count as silence
///
/// # Returns
/// * `frequency` - Frequency of the first loudest bin
/// * `0.0` - Empty frame or peak below `noise_floor`; callers treat it as
///   "nothing detected"
pub fn estimate_frequency(bins: &[u8], sample_rate: u32, noise_floor: u8) -> f32 {
    let mut max_value = 0u8;
    let mut max_index = 0usize;

    for (i, &value) in bins.iter().enumerate() {
        if value > max_value {
            max_value = value;
            max_index = i;
        }
    }

    if bins.is_empty() || max_value < noise_floor {
        return 0.0;
    }

    let nyquist = sample_rate as f32 / 2.0;
    max_index as f32 * nyquist / bins.len() as f32
}

/// Signal strength meter value (0-100) for a detected frequency.
pub fn signal_strength(frequency: f32) -> f32 {
    if !frequency.is_finite() {
        return 0.0;
    }
    (frequency / 10.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;

    #[test]
    fn silent_frame_returns_zero() {
        let bins = vec![0u8; 1024];
        assert_eq!(estimate_frequency(&bins, SAMPLE_RATE, DEFAULT_NOISE_FLOOR), 0.0);
    }

    #[test]
    fn frame_below_floor_returns_zero() {
        for level in [1u8, 64, 100, 129] {
            let mut bins = vec![level / 2; 1024];
            bins[300] = level;
            assert_eq!(
                estimate_frequency(&bins, SAMPLE_RATE, DEFAULT_NOISE_FLOOR),
                0.0
            );
        }
    }

    #[test]
    fn empty_frame_returns_zero() {
        assert_eq!(estimate_frequency(&[], SAMPLE_RATE, 0), 0.0);
    }

    #[test]
    fn loudest_bin_maps_to_hz() {
        let mut bins = vec![20u8; 1024];
        bins[12] = 200;
        bins[40] = 150;
        // 12 * 22050 / 1024
        let freq = estimate_frequency(&bins, SAMPLE_RATE, DEFAULT_NOISE_FLOOR);
        assert!((freq - 258.398).abs() < 0.01);
    }

    #[test]
    fn first_peak_wins_on_equal_magnitude() {
        let mut bins = vec![0u8; 1024];
        bins[20] = 220;
        bins[30] = 220;
        let freq = estimate_frequency(&bins, SAMPLE_RATE, DEFAULT_NOISE_FLOOR);
        assert!((freq - 20.0 * 22050.0 / 1024.0).abs() < 1e-3);
    }

    #[test]
    fn estimate_is_deterministic() {
        let bins: Vec<u8> = (0..1024).map(|i| ((i * 37) % 251) as u8).collect();
        let a = estimate_frequency(&bins, SAMPLE_RATE, DEFAULT_NOISE_FLOOR);
        let b = estimate_frequency(&bins, SAMPLE_RATE, DEFAULT_NOISE_FLOOR);
        assert_eq!(a, b);
    }

    #[test]
    fn signal_strength_is_clamped() {
        assert_eq!(signal_strength(0.0), 0.0);
        assert_eq!(signal_strength(440.0), 44.0);
        assert_eq!(signal_strength(5000.0), 100.0);
        assert_eq!(signal_strength(f32::NAN), 0.0);
    }
}
