//! # Metronome Module
//!
//! A free-running beat clock. Each running clock owns one timer thread that
//! waits on a `crossbeam_channel::tick` and hands every beat to an observer,
//! either a closure run on the timer thread or a channel drained by the
//! caller's own loop.
//!
//! Beats cycle through indices 0..=3; index 0 is the accented downbeat.

use crossbeam_channel::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{PracticeError, Result};

/// Slowest tempo accepted by [`Tempo::new`].
pub const MIN_BPM: u32 = 40;

/// Fastest tempo accepted by [`Tempo::new`].
pub const MAX_BPM: u32 = 208;

/// Beats per measure.
pub const BEATS_PER_MEASURE: u8 = 4;

/// A tempo in beats per minute, always within [`MIN_BPM`]..=[`MAX_BPM`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tempo(u32);

impl Tempo {
    /// Validates `bpm` against the supported range.
    pub fn new(bpm: u32) -> Result<Self> {
        if (MIN_BPM..=MAX_BPM).contains(&bpm) {
            Ok(Tempo(bpm))
        } else {
            Err(PracticeError::TempoOutOfRange {
                bpm,
                min: MIN_BPM,
                max: MAX_BPM,
            })
        }
    }

    /// Clamps `bpm` into the supported range, as a slider would.
    pub fn clamped(bpm: u32) -> Self {
        Tempo(bpm.clamp(MIN_BPM, MAX_BPM))
    }

    pub fn bpm(self) -> u32 {
        self.0
    }

    /// Time between beats (`60000 / bpm` milliseconds).
    pub fn interval(self) -> Duration {
        Duration::from_secs_f64(60.0 / self.0 as f64)
    }

    /// Italian tempo marking for display.
    pub fn marking(self) -> &'static str {
        match self.0 {
            0..60 => "Largo",
            60..76 => "Adagio",
            76..108 => "Andante",
            108..120 => "Moderato",
            120..168 => "Allegro",
            _ => "Presto",
        }
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo(80)
    }
}

/// One metronome tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    /// Position within the measure, 0..=3.
    pub index: u8,
    /// Ticks since this run of the clock started, from 0.
    pub count: u64,
}

impl Beat {
    pub fn is_downbeat(&self) -> bool {
        self.index == 0
    }
}

/// Callback invoked on the timer thread for every beat.
pub type BeatObserver = Box<dyn FnMut(Beat) + Send + 'static>;

/// Timer thread handle. The thread hands the observer back when it exits so
/// a tempo change can restart with the same observer.
struct TimerWorker {
    shutdown_tx: Sender<()>,
    thread_handle: JoinHandle<BeatObserver>,
}

/// Periodic beat source with a Stopped/Running lifecycle.
pub struct BeatClock {
    tempo: Tempo,
    worker: Option<TimerWorker>,
}

impl std::fmt::Debug for BeatClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatClock")
            .field("tempo", &self.tempo)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new(Tempo::default())
    }
}

impl BeatClock {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            tempo,
            worker: None,
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts ticking and returns a receiver that yields every beat.
    ///
    /// A clock that is already running is stopped first; its previous
    /// receiver disconnects.
    pub fn start(&mut self) -> Result<Receiver<Beat>> {
        let (beat_tx, beat_rx) = crossbeam_channel::unbounded();
        self.start_with(move |beat| {
            // The consumer may have gone away; the clock keeps time regardless.
            let _ = beat_tx.send(beat);
        })?;
        Ok(beat_rx)
    }

    /// Starts ticking and calls `on_beat` on the timer thread for each beat.
    ///
    /// A clock that is already running is stopped first. The observer is
    /// kept across [`set_tempo`](Self::set_tempo) restarts and dropped by
    /// [`stop`](Self::stop).
    ///
    /// # Arguments
    /// * `on_beat` - Called once per tick with the beat's measure position,
    ///   starting at the downbeat one interval after the call
    ///
    /// # Returns
    /// `ResourceUnavailable` if the timer thread cannot be spawned.
    pub fn start_with<F>(&mut self, on_beat: F) -> Result<()>
    where
        F: FnMut(Beat) + Send + 'static,
    {
        self.halt();
        self.spawn(Box::new(on_beat))
    }

    /// Stops ticking. Safe to call when already stopped.
    pub fn stop(&mut self) {
        if self.halt().is_some() {
            tracing::info!("metronome stopped");
        }
    }

    /// Changes the tempo. A running clock restarts at the new interval with
    /// its beat counter back at the downbeat.
    pub fn set_tempo(&mut self, tempo: Tempo) -> Result<()> {
        self.tempo = tempo;
        match self.halt() {
            Some(observer) => self.spawn(observer),
            None => Ok(()),
        }
    }

    fn spawn(&mut self, mut on_beat: BeatObserver) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let interval = self.tempo.interval();

        let thread_handle = thread::Builder::new()
            .name("beat-clock".to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(interval);
                let mut index = 0u8;
                let mut count = 0u64;
                loop {
                    crossbeam_channel::select! {
                        recv(ticker) -> _ => {
                            on_beat(Beat { index, count });
                            index = (index + 1) % BEATS_PER_MEASURE;
                            count += 1;
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                on_beat
            })
            .map_err(|e| PracticeError::unavailable(format!("timer thread: {e}")))?;

        tracing::info!(
            bpm = self.tempo.bpm(),
            interval_ms = interval.as_secs_f64() * 1000.0,
            "metronome started"
        );
        self.worker = Some(TimerWorker {
            shutdown_tx,
            thread_handle,
        });
        Ok(())
    }

    /// Stops the timer thread and recovers its observer.
    fn halt(&mut self) -> Option<BeatObserver> {
        let worker = self.worker.take()?;
        let _ = worker.shutdown_tx.send(());
        match worker.thread_handle.join() {
            Ok(observer) => Some(observer),
            Err(_) => {
                tracing::warn!("beat observer panicked; metronome left stopped");
                None
            }
        }
    }
}

impl Drop for BeatClock {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[test]
    fn tempo_range_is_enforced() {
        assert!(Tempo::new(40).is_ok());
        assert!(Tempo::new(208).is_ok());
        assert!(matches!(
            Tempo::new(39),
            Err(PracticeError::TempoOutOfRange { bpm: 39, .. })
        ));
        assert!(Tempo::new(209).is_err());
        assert_eq!(Tempo::clamped(10).bpm(), 40);
        assert_eq!(Tempo::clamped(500).bpm(), 208);
    }

    #[test]
    fn interval_follows_bpm() {
        assert_eq!(Tempo::new(60).unwrap().interval(), Duration::from_secs(1));
        let ms = Tempo::new(90).unwrap().interval().as_secs_f64() * 1000.0;
        assert!((ms - 666.667).abs() < 0.01);
    }

    #[test]
    fn markings() {
        assert_eq!(Tempo::clamped(40).marking(), "Largo");
        assert_eq!(Tempo::clamped(72).marking(), "Adagio");
        assert_eq!(Tempo::clamped(80).marking(), "Andante");
        assert_eq!(Tempo::clamped(112).marking(), "Moderato");
        assert_eq!(Tempo::clamped(140).marking(), "Allegro");
        assert_eq!(Tempo::clamped(200).marking(), "Presto");
    }

    #[test]
    fn ninety_bpm_ticks_three_times_in_two_seconds() {
        let mut clock = BeatClock::new(Tempo::new(90).unwrap());
        let start = Instant::now();
        let beats = clock.start().unwrap();

        let deadline = start + Duration::from_millis(2150);
        let mut seen = Vec::new();
        while let Ok(beat) = beats.recv_deadline(deadline) {
            seen.push((beat, start.elapsed()));
        }
        clock.stop();

        let indices: Vec<u8> = seen.iter().map(|(b, _)| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        for (i, (_, at)) in seen.iter().enumerate() {
            let expected = 666.667 * (i as f64 + 1.0);
            let actual = at.as_secs_f64() * 1000.0;
            assert!(
                (actual - expected).abs() < 120.0,
                "beat {i} at {actual:.0}ms, expected ~{expected:.0}ms"
            );
        }
    }

    #[test]
    fn index_wraps_every_four_beats() {
        let mut clock = BeatClock::new(Tempo::new(208).unwrap());
        let beats = clock.start().unwrap();
        let seen: Vec<Beat> = beats.iter().take(6).collect();
        clock.stop();

        let indices: Vec<u8> = seen.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0, 1]);
        assert!(seen[0].is_downbeat());
        assert!(seen[4].is_downbeat());
        assert_eq!(seen[5].count, 5);
    }

    #[test]
    fn stop_is_idempotent_and_safe_before_start() {
        let mut clock = BeatClock::default();
        clock.stop();
        assert!(!clock.is_running());

        let beats = clock.start().unwrap();
        assert!(clock.is_running());
        clock.stop();
        clock.stop();
        assert!(!clock.is_running());

        // Sender lives in the stopped thread's observer, which is dropped.
        assert!(beats.recv_timeout(Duration::from_millis(900)).is_err());
    }

    #[test]
    fn observer_runs_on_timer_thread() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut clock = BeatClock::new(Tempo::new(208).unwrap());
        clock
            .start_with(move |beat| sink.lock().unwrap().push(beat.index))
            .unwrap();
        thread::sleep(Duration::from_millis(700));
        clock.stop();

        let indices = seen.lock().unwrap().clone();
        assert!(indices.len() >= 2, "only {} beats", indices.len());
        assert_eq!(indices[0], 0);
        assert_eq!(indices[1], 1);
    }

    #[test]
    fn tempo_change_restarts_at_downbeat() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut clock = BeatClock::new(Tempo::new(208).unwrap());
        clock
            .start_with(move |beat| sink.lock().unwrap().push(beat))
            .unwrap();
        thread::sleep(Duration::from_millis(650));

        clock.set_tempo(Tempo::new(200).unwrap()).unwrap();
        assert!(clock.is_running());
        let before = seen.lock().unwrap().len();
        assert!(before >= 2);
        thread::sleep(Duration::from_millis(450));
        clock.stop();

        let beats = seen.lock().unwrap().clone();
        assert!(beats.len() > before);
        assert_eq!(beats[before].index, 0);
        assert_eq!(beats[before].count, 0);
    }

    #[test]
    fn tempo_change_while_stopped_does_not_start() {
        let mut clock = BeatClock::default();
        clock.set_tempo(Tempo::new(120).unwrap()).unwrap();
        assert!(!clock.is_running());
        assert_eq!(clock.tempo().bpm(), 120);
    }
}
