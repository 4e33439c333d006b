//! Run timing and progress accounting.
//!
//! The pipeline calls a `ProgressObserver` after every image, unconditionally.
//! Whether an update is rendered (terminal bar, log line, nothing) is decided
//! by the observer the caller passes in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

// ----------------------------------------------------------------------------
// Clocks and stopwatches
// ----------------------------------------------------------------------------

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that advances by a fixed step every time it is read.
///
/// Makes per-image timings reproducible in tests and dry runs.
pub struct SteppingClock {
    step_nanos: u64,
    ticks: AtomicU64,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            step_nanos: step.as_nanos() as u64,
            ticks: AtomicU64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        Duration::from_nanos(tick * self.step_nanos)
    }
}

/// Measures time since it was started.
#[derive(Clone)]
pub struct Stopwatch {
    clock: Arc<dyn Clock>,
    start: Duration,
}

impl Stopwatch {
    pub fn start(clock: Arc<dyn Clock>) -> Self {
        let start = clock.now();
        Self { clock, start }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.start)
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

// ----------------------------------------------------------------------------
// Progress math
// ----------------------------------------------------------------------------

/// Linear estimate of the time left: average cost so far times images left.
///
/// Requires `0 < done <= total`. The result is truncated to whole seconds.
pub fn remaining_time(elapsed: Duration, done: usize, total: usize) -> Result<Duration> {
    if done == 0 {
        return Err(anyhow!("remaining time is undefined before the first image completes"));
    }
    if done > total {
        return Err(anyhow!("processed count {} exceeds total {}", done, total));
    }
    let remaining = elapsed.as_secs_f64() / done as f64 * (total - done) as f64;
    Ok(Duration::from_secs(remaining as u64))
}

/// Snapshot handed to observers after each image.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    pub processed: usize,
    pub total: usize,
    /// Detections accumulated so far.
    pub detected: usize,
    pub percent: f64,
    /// Whole seconds since the run started.
    pub elapsed: Duration,
    /// Whole seconds estimated until the run ends.
    pub remaining: Duration,
}

impl ProgressUpdate {
    pub fn compute(elapsed: Duration, processed: usize, total: usize, detected: usize) -> Result<Self> {
        let remaining = remaining_time(elapsed, processed, total)?;
        Ok(Self {
            processed,
            total,
            detected,
            percent: processed as f64 / total as f64 * 100.0,
            elapsed: Duration::from_secs(elapsed.as_secs()),
            remaining,
        })
    }

    /// One-line human readable status.
    pub fn status_line(&self) -> String {
        format!(
            "YOLO8 | Image: {} / {} ( {:.2}% ) | Detected: {} | Elapsed: {} | Remaining: {}",
            self.processed,
            self.total,
            self.percent,
            self.detected,
            format_hms(self.elapsed),
            format_hms(self.remaining)
        )
    }
}

/// `H:MM:SS`, prefixed with `N day(s), ` past 24 hours.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    let days = secs / 86_400;
    let rest = secs % 86_400;
    let hms = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => hms,
        1 => format!("1 day, {hms}"),
        n => format!("{n} days, {hms}"),
    }
}

// ----------------------------------------------------------------------------
// Observers
// ----------------------------------------------------------------------------

/// Receives a progress update after every processed image.
pub trait ProgressObserver {
    fn on_progress(&mut self, update: &ProgressUpdate);

    /// Called once when the run stops, successfully or not.
    fn on_finish(&mut self) {}
}

/// Discards all updates.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _update: &ProgressUpdate) {}
}

/// Writes each update to the log at debug level.
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&mut self, update: &ProgressUpdate) {
        log::debug!("{}", update.status_line());
    }
}

impl<F: FnMut(&ProgressUpdate)> ProgressObserver for F {
    fn on_progress(&mut self, update: &ProgressUpdate) {
        self(update)
    }
}
