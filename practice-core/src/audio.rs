//! # Audio Capture Module
//!
//! Microphone capture through CPAL. The input stream is created and owned by
//! a dedicated audio thread; fixed-size frames flow back over a crossbeam
//! channel. Only one capture session may exist per process.
//!
//! ## Features
//! - Mono capture at 44.1 kHz where the device allows it
//! - Cancellable start with a timeout
//! - Permission failures reported separately from missing devices
//!
//! ## Lifecycle
//! - `start` blocks until the audio thread reports that the stream is
//!   playing, or that it failed (permission, missing device, bad config).
//! - `stop` pauses and drops the stream and joins the thread. It is
//!   idempotent and also runs on drop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{PracticeError, Result};

/// Preferred capture sample rate.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Frames buffered between the audio callback and the consumer. New
/// frames are dropped when the consumer falls behind.
const FRAME_QUEUE_DEPTH: usize = 8;

/// Set while an input stream exists anywhere in the process.
static CAPTURE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Exclusive claim on the process-wide capture slot.
#[derive(Debug)]
pub(crate) struct CaptureGuard(());

impl CaptureGuard {
    pub(crate) fn acquire() -> Result<Self> {
        CAPTURE_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| CaptureGuard(()))
            .map_err(|_| PracticeError::CaptureBusy)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE_ACTIVE.store(false, Ordering::Release);
    }
}

/// Audio thread handle.
#[derive(Debug)]
struct AudioWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioWorker {
    /// Spawns the thread that owns the input stream and waits for it to
    /// report in.
    ///
    /// # Arguments
    /// * `guard` - Held by the thread for as long as it may own a stream.
    /// * `open` - Opens and starts the stream on the audio thread.
    /// * `timeout` - How long to wait for `open`; `None` waits indefinitely.
    ///
    /// # Returns
    /// The running worker and the stream's sample rate. On timeout the thread
    /// is left to finish on its own: it closes the stream as soon as `open`
    /// returns and only then releases `guard`.
    fn launch<G, S, F>(guard: G, open: F, timeout: Option<Duration>) -> Result<(Self, u32)>
    where
        G: Send + 'static,
        S: StreamTrait,
        F: FnOnce() -> Result<(S, u32)> + Send + 'static,
    {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let _guard = guard;
                tracing::debug!("audio thread starting");
                match open() {
                    Ok((stream, sample_rate)) => {
                        if ready_tx.send(Ok(sample_rate)).is_err() {
                            tracing::debug!("capture start abandoned; closing stream");
                        } else {
                            let _ = shutdown_rx.recv();
                        }
                        if let Err(e) = stream.pause() {
                            tracing::warn!(error = %e, "error pausing input stream");
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                tracing::debug!("audio thread finished");
            })
            .map_err(|e| PracticeError::unavailable(format!("audio thread: {e}")))?;

        let outcome = match timeout {
            Some(timeout) => ready_rx.recv_timeout(timeout).map_err(|e| e.is_timeout()),
            None => ready_rx.recv().map_err(|_| false),
        };

        match outcome {
            Ok(Ok(sample_rate)) => Ok((
                Self {
                    shutdown_tx,
                    thread_handle: Some(thread_handle),
                },
                sample_rate,
            )),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(true) => {
                // Dropping `ready_rx` lets the thread notice and close its stream.
                let _ = shutdown_tx.send(());
                Err(PracticeError::unavailable(
                    "timed out waiting for the input device",
                ))
            }
            Err(false) => {
                let _ = thread_handle.join();
                Err(PracticeError::unavailable("audio thread exited"))
            }
        }
    }

    /// Signals the thread and waits for it to release the stream.
    fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("audio thread panicked during shutdown");
            }
        }
    }
}

/// A running microphone capture.
#[derive(Debug)]
pub struct CaptureSession {
    frames: Receiver<Vec<f32>>,
    sample_rate: u32,
    worker: Option<AudioWorker>,
}

impl CaptureSession {
    /// Starts capturing from the default input device.
    ///
    /// Blocks until the platform grants access or refuses it.
    ///
    /// # Arguments
    /// * `frame_size` - Samples per delivered frame, normally the FFT size.
    ///
    /// # Returns
    /// A running session whose [`frames`](Self::frames) receiver yields mono
    /// frames of exactly `frame_size` samples. Fails with `CaptureBusy` when
    /// another session is live, `PermissionDenied` when access is refused,
    /// and `ResourceUnavailable` for missing devices or unusable formats.
    pub fn start(frame_size: usize) -> Result<Self> {
        Self::start_inner(frame_size, None)
    }

    /// Like [`CaptureSession::start`], but gives up after `timeout`.
    ///
    /// On timeout the audio thread is told to shut down as soon as it gets
    /// its stream; the capture slot stays claimed until it has.
    pub fn start_with_timeout(frame_size: usize, timeout: Duration) -> Result<Self> {
        Self::start_inner(frame_size, Some(timeout))
    }

    fn start_inner(frame_size: usize, timeout: Option<Duration>) -> Result<Self> {
        let guard = CaptureGuard::acquire()?;
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Vec<f32>>(FRAME_QUEUE_DEPTH);

        match AudioWorker::launch(
            guard,
            move || open_input_stream(frame_tx, frame_size),
            timeout,
        ) {
            Ok((worker, sample_rate)) => {
                tracing::info!(sample_rate, frame_size, "microphone capture started");
                Ok(Self {
                    frames: frame_rx,
                    sample_rate,
                    worker: Some(worker),
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "microphone capture failed to start");
                Err(e)
            }
        }
    }

    /// Receiver yielding captured frames. Disconnects once stopped.
    pub fn frames(&self) -> &Receiver<Vec<f32>> {
        &self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Releases the input stream. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            tracing::info!("microphone capture stopped");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Maps a CPAL failure onto the error taxonomy. Backends report denied
/// microphone access as a backend-specific message.
fn classify_stream_error(err: impl std::fmt::Display) -> PracticeError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        PracticeError::PermissionDenied
    } else {
        PracticeError::ResourceUnavailable(message)
    }
}

/// Opens the default input device and starts streaming frames.
fn open_input_stream(sender: Sender<Vec<f32>>, frame_size: usize) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| PracticeError::unavailable("no input device available"))?;

    match device.name() {
        Ok(name) => tracing::info!(device = %name, "using audio input device"),
        Err(e) => tracing::debug!(error = %e, "input device has no name"),
    }

    let configs = device
        .supported_input_configs()
        .map_err(classify_stream_error)?
        .collect::<Vec<_>>();

    let (config, sample_format) = match find_supported_config(configs, TARGET_SAMPLE_RATE) {
        Some(range) => {
            let rate = TARGET_SAMPLE_RATE.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
            let supported = range.with_sample_rate(cpal::SampleRate(rate));
            (supported.config(), supported.sample_format())
        }
        None => {
            let supported = device
                .default_input_config()
                .map_err(classify_stream_error)?;
            (supported.config(), supported.sample_format())
        }
    };

    tracing::info!(
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        format = ?sample_format,
        "selected input configuration"
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, sender, frame_size)?,
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, sender, frame_size)?,
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, sender, frame_size)?,
        other => {
            return Err(PracticeError::unavailable(format!(
                "unsupported input sample format {other:?}"
            )));
        }
    };
    stream.play().map_err(classify_stream_error)?;

    Ok((stream, config.sample_rate.0))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: Sender<Vec<f32>>,
    frame_size: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let mut framer = Framer::new(frame_size);

    let err_fn = |err: cpal::StreamError| tracing::warn!(error = %err, "input stream error");

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Keep the first channel only.
                let mono = data.iter().step_by(channels).map(|&s| f32::from_sample(s));
                framer.push(mono, |frame| {
                    // Drop the frame if the consumer is behind.
                    let _ = sender.try_send(frame);
                });
            },
            err_fn,
            None,
        )
        .map_err(classify_stream_error)
}

/// Cuts a continuous sample stream into fixed-size frames.
#[derive(Debug)]
pub(crate) struct Framer {
    buffer: Vec<f32>,
    frame_size: usize,
}

impl Framer {
    pub(crate) fn new(frame_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(frame_size * 2),
            frame_size: frame_size.max(1),
        }
    }

    /// Appends samples and emits every complete frame.
    pub(crate) fn push<I, F>(&mut self, samples: I, mut emit: F)
    where
        I: IntoIterator<Item = f32>,
        F: FnMut(Vec<f32>),
    {
        self.buffer.extend(samples);
        while self.buffer.len() >= self.frame_size {
            emit(self.buffer[..self.frame_size].to_vec());
            self.buffer.drain(..self.frame_size);
        }
    }
}

/// Picks a mono configuration whose rate range is closest to `target_rate`,
/// preferring 32-bit float.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if (min..=max).contains(&target_rate) {
                0
            } else {
                (min as i64 - target_rate as i64)
                    .abs()
                    .min((max as i64 - target_rate as i64).abs())
            };
            let not_float = c.sample_format() != cpal::SampleFormat::F32;
            (distance, not_float)
        })
}
