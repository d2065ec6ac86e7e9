//! # Sample Window Module
//!
//! Rolling history of recent pitch samples. Per-frame detections are noisy;
//! the beat-synchronised matcher only trusts a note that appears in at least
//! `min_count` of the last few frames.

use std::collections::VecDeque;

use crate::PitchSample;
use crate::tuning::NoteName;

/// Default window length.
pub const DEFAULT_CAPACITY: usize = 4;

/// Default number of agreeing frames required for a consensus.
pub const DEFAULT_MIN_COUNT: usize = 2;

/// FIFO buffer of the most recent samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<PitchSample>,
    capacity: usize,
    min_count: usize,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_MIN_COUNT)
    }
}

impl SampleWindow {
    pub fn new(capacity: usize, min_count: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
            min_count: min_count.max(1),
        }
    }

    /// Appends a sample, evicting the oldest once over capacity.
    pub fn add_sample(&mut self, sample: PitchSample) {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// The most frequent note in the window, if it occurs at least
    /// `min_count` times. Samples without a note are ignored.
    pub fn consensus_note(&self) -> Option<&'static NoteName> {
        let mut counts: Vec<(&'static NoteName, usize)> = Vec::with_capacity(self.capacity);
        for note in self.samples.iter().filter_map(|s| s.note) {
            match counts.iter_mut().find(|(n, _)| std::ptr::eq(*n, note)) {
                Some((_, count)) => *count += 1,
                None => counts.push((note, 1)),
            }
        }

        let mut best: Option<(&'static NoteName, usize)> = None;
        for (note, count) in counts {
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((note, count));
            }
        }

        best.filter(|&(_, count)| count >= self.min_count)
            .map(|(note, _)| note)
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
