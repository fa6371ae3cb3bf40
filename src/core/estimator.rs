//! Time-based progress estimation for phases that report nothing themselves.
//!
//! Model loading and separation are opaque blocking calls. While one runs, an
//! [`Estimator`] thread samples a saturating curve on a fixed cadence and
//! pushes the result through the [`ProgressReporter`]. The estimator is a
//! guard: stopping it (or dropping it on an error path) closes its emission
//! gate, joins the thread with a bounded wait and fences the reporter, so no
//! estimator line can appear after the phase is over.

use crate::io::progress::ProgressReporter;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

pub const LOADING_INTERVAL: Duration = Duration::from_millis(400);
pub const PROCESSING_INTERVAL: Duration = Duration::from_millis(300);
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

pub const LOADING_FLOOR: u8 = 1;
pub const LOADING_CEILING: u8 = 10;
const LOADING_HALF_LIFE_SECS: f64 = 15.0;

pub const PROCESSING_START: u8 = 12;
pub const PROCESSING_CEILING: u8 = 88;
const PROCESSING_SPAN: f64 = 76.0;
/// Denominator used when turning percent back into a completed fraction for the ETA.
const ETA_SPAN: f64 = 78.0;
const ETA_MIN_PERCENT: u8 = 15;
const ETA_MIN_FRACTION: f64 = 0.05;

/// Estimated separation time multipliers, relative to the audio duration.
pub const CPU_TIME_FACTOR: f64 = 4.0;
pub const GPU_TIME_FACTOR: f64 = 0.5;

/// Maps elapsed phase time to a percent and a stage label.
pub trait PhaseCurve: Send + 'static {
    fn sample(&mut self, elapsed: Duration) -> (u8, String);
}

/// `1 + 9·(1 − 0.5^(t/15))`, capped at 10.
pub struct LoadingCurve {
    device_name: String,
}

impl LoadingCurve {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    pub fn percent_at(elapsed: Duration) -> u8 {
        let t = elapsed.as_secs_f64();
        let ratio = 1.0 - 0.5f64.powf(t / LOADING_HALF_LIFE_SECS);
        let pct = (LOADING_FLOOR as f64 + ratio * 9.0) as u8;
        pct.min(LOADING_CEILING)
    }
}

impl PhaseCurve for LoadingCurve {
    fn sample(&mut self, elapsed: Duration) -> (u8, String) {
        let pct = Self::percent_at(elapsed);
        let secs = elapsed.as_secs_f64();
        let stage = if secs < 60.0 {
            format!("Loading model ({:.0}s) [{}]", secs, self.device_name)
        } else {
            format!("Loading model ({}) [{}]", clock(elapsed.as_secs()), self.device_name)
        };
        (pct, stage)
    }
}

/// `12 + 76·(1 − 0.5^(t/T_est))`, never below the previous sample, capped at 88.
pub struct ProcessingCurve {
    estimated_secs: f64,
    device_name: String,
    last: u8,
}

impl ProcessingCurve {
    pub fn new(estimated_secs: f64, device_name: impl Into<String>) -> Self {
        Self {
            estimated_secs: estimated_secs.max(0.0),
            device_name: device_name.into(),
            last: PROCESSING_START - 1,
        }
    }

    pub fn raw_percent_at(&self, elapsed: Duration) -> u8 {
        let t = elapsed.as_secs_f64();
        let pct = if self.estimated_secs > 0.0 {
            let ratio = 1.0 - 0.5f64.powf(t / self.estimated_secs);
            PROCESSING_START as f64 + ratio * PROCESSING_SPAN
        } else {
            PROCESSING_START as f64 + t * 2.0
        };
        pct.min(PROCESSING_CEILING as f64) as u8
    }

    /// Remaining seconds, once progress is far enough along to extrapolate.
    pub fn eta_secs(percent: u8, elapsed: Duration) -> Option<u64> {
        if percent <= ETA_MIN_PERCENT {
            return None;
        }
        let fraction = (percent - PROCESSING_START) as f64 / ETA_SPAN;
        if fraction <= ETA_MIN_FRACTION {
            return None;
        }
        let elapsed = elapsed.as_secs_f64();
        let total = elapsed / fraction;
        Some((total - elapsed).max(0.0) as u64)
    }
}

impl PhaseCurve for ProcessingCurve {
    fn sample(&mut self, elapsed: Duration) -> (u8, String) {
        let pct = self.raw_percent_at(elapsed).max(self.last).min(PROCESSING_CEILING);
        self.last = pct;

        let eta = Self::eta_secs(pct, elapsed)
            .map(|s| format!(" | ETA {}", clock(s)))
            .unwrap_or_default();
        let stage = format!(
            "Processing ({}{}) [{}]",
            clock(elapsed.as_secs()),
            eta,
            self.device_name
        );
        (pct, stage)
    }
}

/// Estimated separation time for `duration_secs` of audio.
pub fn estimated_processing_secs(duration_secs: f64, on_cpu: bool) -> f64 {
    let factor = if on_cpu { CPU_TIME_FACTOR } else { GPU_TIME_FACTOR };
    duration_secs * factor
}

fn clock(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// A running background estimator. Stops on [`stop`](Self::stop) or drop.
pub struct Estimator {
    phase: &'static str,
    gate: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    reporter: ProgressReporter,
}

impl Estimator {
    pub fn start<C: PhaseCurve>(
        phase: &'static str,
        mut curve: C,
        interval: Duration,
        reporter: ProgressReporter,
    ) -> Self {
        let gate = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let thread_gate = gate.clone();
        let thread_reporter = reporter.clone();
        let handle = thread::Builder::new()
            .name(format!("estimator-{}", phase))
            .spawn(move || {
                let started = Instant::now();
                loop {
                    let (pct, stage) = curve.sample(started.elapsed());
                    if !thread_reporter.emit_gated(&thread_gate, pct, &stage) {
                        break;
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                let _ = done_tx.send(());
            });

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                log::warn!("could not start {} estimator: {}", phase, e);
                None
            }
        };
        log::debug!("{} estimator started", phase);

        Self {
            phase,
            gate,
            stop_tx: Some(stop_tx),
            done_rx,
            handle,
            reporter,
        }
    }

    pub fn loading(device_name: &str, reporter: ProgressReporter) -> Self {
        Self::start("loading", LoadingCurve::new(device_name), LOADING_INTERVAL, reporter)
    }

    pub fn processing(estimated_secs: f64, device_name: &str, reporter: ProgressReporter) -> Self {
        Self::start(
            "processing",
            ProcessingCurve::new(estimated_secs, device_name),
            PROCESSING_INTERVAL,
            reporter,
        )
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.gate.store(false, Ordering::Release);
        // Dropping the sender wakes the thread out of its wait.
        drop(self.stop_tx.take());

        match self.done_rx.recv_timeout(JOIN_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{} estimator did not stop within {:?}; detaching",
                    self.phase,
                    JOIN_TIMEOUT
                );
            }
            _ => {
                if handle.join().is_err() {
                    log::warn!("{} estimator panicked", self.phase);
                }
            }
        }
        self.reporter.fence();
        log::debug!("{} estimator stopped", self.phase);
    }
}

impl Drop for Estimator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
