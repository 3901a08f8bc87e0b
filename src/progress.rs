//! Cosmetic, time-based completion estimate shown while a request is pending.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Highest value the estimate may reach before the real result arrives.
pub const MAX_ESTIMATE: f64 = 98.0;

pub const COMPLETE: f64 = 100.0;

pub const PROGRESS_MESSAGES: &[&str] = &[
    "Analyzing facial features...",
    "Sketching the composition...",
    "Applying the chosen style...",
    "Rendering colors and lighting...",
    "Adding finishing touches...",
];

/// One sample of the simulated progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimate {
    /// Percent, `0.0..=MAX_ESTIMATE`.
    pub percent: f64,
    /// Index into [`PROGRESS_MESSAGES`].
    pub step: usize,
}

pub fn estimate(elapsed: Duration, expected: Duration) -> ProgressEstimate {
    let percent = if expected.is_zero() {
        MAX_ESTIMATE
    } else {
        (elapsed.as_secs_f64() / expected.as_secs_f64() * 100.0).min(MAX_ESTIMATE)
    };
    ProgressEstimate {
        percent,
        step: step_for(percent),
    }
}

pub fn step_for(percent: f64) -> usize {
    let last = PROGRESS_MESSAGES.len() - 1;
    let index = (percent / 100.0 * PROGRESS_MESSAGES.len() as f64).floor();
    if index.is_nan() || index < 0.0 {
        0
    } else {
        (index as usize).min(last)
    }
}

pub fn message_for(step: usize) -> &'static str {
    PROGRESS_MESSAGES[step.min(PROGRESS_MESSAGES.len() - 1)]
}

/// Repeating tick task bound to the lifetime of one pending request.
///
/// Dropping the handle aborts the task, so no tick is delivered after the
/// owning state has been left.
#[derive(Debug)]
pub struct ProgressTimer {
    request_id: u64,
    handle: JoinHandle<()>,
}

impl ProgressTimer {
    /// Start ticking; `make_tick` receives the request id and the time
    /// elapsed since start, and builds the message sent on every interval.
    pub fn start<T, F>(request_id: u64, period: Duration, tx: mpsc::Sender<T>, make_tick: F) -> Self
    where
        T: Send + 'static,
        F: Fn(u64, Duration) -> T + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(make_tick(request_id, started.elapsed())).await.is_err() {
                    break;
                }
            }
        });
        Self { request_id, handle }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

impl Drop for ProgressTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
