//! Bounded readiness polling.
//!
//! The NI 4050 signals "ready for the next register write" and "new
//! acquisition data" through status bits. [`ReadyPoller`] polls such a bit a
//! bounded number of times, sleeping a fixed interval between attempts. The
//! sleep goes through [`Sleeper`] so tests run without real delays.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{DmmError, Result};

/// Blocking sleep primitive.
pub trait Sleeper: Send + Sync {
    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

/// Iteration limits for the two kinds of readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLimits {
    /// ADC ready for the next register write (configuration).
    pub adc_ready: u32,
    /// New measurement data available (acquisition).
    pub data_ready: u32,
}

impl Default for PollLimits {
    fn default() -> Self {
        Self {
            adc_ready: 100,
            data_ready: 250,
        }
    }
}

/// Bounded busy-wait on a status predicate.
#[derive(Clone)]
pub struct ReadyPoller {
    interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl ReadyPoller {
    /// Poller sleeping on the calling thread.
    pub fn new(interval: Duration) -> Self {
        Self::with_sleeper(interval, ThreadSleeper)
    }

    /// Poller with a custom sleep primitive.
    pub fn with_sleeper(interval: Duration, sleeper: impl Sleeper + 'static) -> Self {
        Self {
            interval,
            sleeper: Arc::new(sleeper),
        }
    }

    /// Interval slept between attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Evaluate `ready` up to `max_iterations` times, sleeping between
    /// attempts, until it reports true.
    ///
    /// Returns [`DmmError::Timeout`] naming `what` once the budget is spent;
    /// the predicate is evaluated exactly `max_iterations` times in that
    /// case. Errors from the predicate abort the wait immediately.
    pub fn wait_ready<F>(&self, what: &'static str, max_iterations: u32, mut ready: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        for attempt in 1..=max_iterations {
            if ready()? {
                return Ok(());
            }
            if attempt < max_iterations {
                self.sleeper.sleep(self.interval);
            }
        }
        Err(DmmError::Timeout {
            what,
            attempts: max_iterations,
        })
    }
}

impl std::fmt::Debug for ReadyPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyPoller")
            .field("interval", &self.interval)
            .finish()
    }
}
