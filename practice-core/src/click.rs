//! # Click Module
//!
//! Audible metronome clicks: a short sine burst per beat, pitched higher on
//! the downbeat. Playback runs on its own output stream so a missing output
//! device only silences the click.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::config::MetronomeConfig;
use crate::error::{PracticeError, Result};
use crate::metronome::Beat;

/// Pitch, gain, and length of a click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickSound {
    pub frequency: f32,
    pub gain: f32,
    pub duration_ms: u32,
}

/// Accent and regular click sounds taken from the metronome config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickSet {
    pub accent: ClickSound,
    pub regular: ClickSound,
}

impl ClickSet {
    pub fn from_config(config: &MetronomeConfig) -> Self {
        let sound = |frequency| ClickSound {
            frequency,
            gain: config.click_volume,
            duration_ms: config.click_ms,
        };
        Self {
            accent: sound(config.accent_hz),
            regular: sound(config.beat_hz),
        }
    }

    pub fn for_beat(&self, beat: Beat) -> ClickSound {
        if beat.is_downbeat() {
            self.accent
        } else {
            self.regular
        }
    }
}

/// Sine oscillator that plays one click and then falls silent.
#[derive(Debug, Clone)]
pub struct ClickVoice {
    phase: f32,
    phase_step: f32,
    gain: f32,
    remaining: usize,
}

impl ClickVoice {
    pub fn new(sound: ClickSound, sample_rate: u32) -> Self {
        let remaining = (sample_rate as u64 * sound.duration_ms as u64 / 1000) as usize;
        Self {
            phase: 0.0,
            phase_step: sound.frequency / sample_rate as f32,
            gain: sound.gain,
            remaining,
        }
    }

    pub fn silent() -> Self {
        Self {
            phase: 0.0,
            phase_step: 0.0,
            gain: 0.0,
            remaining: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.remaining == 0 {
            return 0.0;
        }
        self.remaining -= 1;
        let value = (2.0 * std::f32::consts::PI * self.phase).sin() * self.gain;
        self.phase = (self.phase + self.phase_step).fract();
        value
    }
}

/// Output-stream thread handle.
struct OutputWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

/// Plays clicks on the default output device.
pub struct ClickPlayer {
    clicks: ClickSet,
    trigger_tx: Sender<ClickSound>,
    worker: Option<OutputWorker>,
}

impl ClickPlayer {
    /// Opens the default output device on a dedicated audio thread.
    pub fn start(config: &MetronomeConfig) -> Result<Self> {
        let (trigger_tx, trigger_rx) = crossbeam_channel::bounded::<ClickSound>(4);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_handle = thread::Builder::new()
            .name("click-output".to_string())
            .spawn(move || match open_output_stream(trigger_rx) {
                Ok((stream, sample_rate)) => {
                    let _ = ready_tx.send(Ok(sample_rate));
                    let _ = shutdown_rx.recv();
                    if let Err(e) = stream.pause() {
                        tracing::warn!(error = %e, "error pausing click stream");
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| PracticeError::unavailable(format!("click thread: {e}")))?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(PracticeError::unavailable("click thread exited"));
            }
        };
        tracing::info!(sample_rate, "click output started");

        Ok(Self {
            clicks: ClickSet::from_config(config),
            trigger_tx,
            worker: Some(OutputWorker {
                shutdown_tx,
                thread_handle: Some(thread_handle),
            }),
        })
    }

    /// Queues the click for `beat`. Dropped if the output is backed up.
    pub fn play(&self, beat: Beat) {
        let _ = self.trigger_tx.try_send(self.clicks.for_beat(beat));
    }

    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(());
            if let Some(handle) = worker.thread_handle.take() {
                let _ = handle.join();
            }
            tracing::info!("click output stopped");
        }
    }
}

impl Drop for ClickPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_output_stream(trigger_rx: Receiver<ClickSound>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PracticeError::unavailable("no output device available"))?;
    let supported = device
        .default_output_config()
        .map_err(PracticeError::unavailable)?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, trigger_rx)?,
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, trigger_rx)?,
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, trigger_rx)?,
        other => {
            return Err(PracticeError::unavailable(format!(
                "unsupported output sample format {other:?}"
            )));
        }
    };
    stream.play().map_err(PracticeError::unavailable)?;

    Ok((stream, config.sample_rate.0))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    trigger_rx: Receiver<ClickSound>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    let mut voice = ClickVoice::silent();

    let err_fn = |err: cpal::StreamError| tracing::warn!(error = %err, "click stream error");

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if let Ok(sound) = trigger_rx.try_recv() {
                    voice = ClickVoice::new(sound, sample_rate);
                }
                for frame in data.chunks_mut(channels) {
                    let value = T::from_sample(voice.next_sample());
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(PracticeError::unavailable)
}
