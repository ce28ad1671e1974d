//! Monotonic wall-clock timing for bracketing timed regions.
//!
//! `Instant` is monotonic and immune to wall-clock adjustments, and elapsed
//! durations are non-negative by construction, which is all the harness needs.

use std::time::{Duration, Instant};

/// Thin stopwatch over [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start timing now.
    pub fn start() -> Self {
        Stopwatch {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time as fractional seconds, for the printf-style reports.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// The instant this stopwatch was started.
    pub fn started_at(&self) -> Instant {
        self.started
    }
}
