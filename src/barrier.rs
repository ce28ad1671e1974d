//! Two-phase ready/start rendezvous.
//!
//! Workers bind their affinity, then `arrive()`: one atomic increment of the
//! ready counter followed by a busy-wait on the start flag. The driver
//! `release()`s once the ready counter matches the worker count, recording the
//! start instant *before* flipping the flag so the recorded timestamp never
//! postdates any worker's observed release.
//!
//! One `StartLine` is created per experiment run and discarded after all
//! workers join. The start flag transitions false→true exactly once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Rendezvous state shared between the driver and its workers.
#[derive(Debug, Default)]
pub struct StartLine {
    ready: AtomicUsize,
    go: AtomicBool,
}

impl StartLine {
    pub fn new() -> Self {
        StartLine {
            ready: AtomicUsize::new(0),
            go: AtomicBool::new(false),
        }
    }

    /// Worker side: signal readiness, then spin until released.
    ///
    /// The spin uses [`std::hint::spin_loop`] so SMT siblings waiting here
    /// yield pipeline resources instead of hammering the flag.
    pub fn arrive(&self) {
        self.ready.fetch_add(1, Ordering::SeqCst);
        while !self.go.load(Ordering::SeqCst) {
            std::hint::spin_loop();
        }
    }

    /// Driver side: wait for `expected` workers to arrive, then release them.
    ///
    /// Returns the instant taken immediately before the start flag was set.
    /// Errors with [`Error::BarrierTimeout`] instead of hanging if a worker
    /// never signals readiness within `timeout`.
    pub fn release(&self, expected: usize, timeout: Duration) -> Result<Instant> {
        let deadline = Instant::now() + timeout;
        while self.ready.load(Ordering::SeqCst) < expected {
            if Instant::now() >= deadline {
                return Err(Error::BarrierTimeout {
                    timeout,
                    ready: self.ready.load(Ordering::SeqCst),
                    expected,
                });
            }
            // Thread startup latency bounds this wait; yielding is fine here,
            // only the workers' spin is latency-sensitive.
            std::thread::yield_now();
        }

        let released_at = Instant::now();
        self.go.store(true, Ordering::SeqCst);
        Ok(released_at)
    }

    pub fn ready_count(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.go.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn release_waits_for_all_workers() {
        let line = Arc::new(StartLine::new());
        let n = 2;

        let workers: Vec<_> = (0..n)
            .map(|_| {
                let line = Arc::clone(&line);
                thread::spawn(move || {
                    line.arrive();
                    Instant::now()
                })
            })
            .collect();

        let released_at = line.release(n, Duration::from_secs(5)).unwrap();

        for w in workers {
            let observed = w.join().unwrap();
            // No worker observes the release before the driver recorded it.
            assert!(observed >= released_at);
        }
        assert_eq!(line.ready_count(), n);
        assert!(line.is_released());
    }

    #[test]
    fn release_times_out_when_a_worker_is_missing() {
        let line = Arc::new(StartLine::new());
        let helper = {
            let line = Arc::clone(&line);
            thread::spawn(move || line.arrive())
        };

        match line.release(2, Duration::from_millis(50)) {
            Err(Error::BarrierTimeout {
                ready, expected, ..
            }) => {
                assert!(ready <= 1);
                assert_eq!(expected, 2);
            }
            other => panic!("expected BarrierTimeout, got {other:?}"),
        }

        // Unblock the lone arrival so the test can join it.
        line.go.store(true, Ordering::SeqCst);
        helper.join().unwrap();
    }

    #[test]
    fn single_worker_barrier_is_trivial() {
        let line = Arc::new(StartLine::new());
        let worker = {
            let line = Arc::clone(&line);
            thread::spawn(move || line.arrive())
        };
        line.release(1, Duration::from_secs(5)).unwrap();
        worker.join().unwrap();
        assert_eq!(line.ready_count(), 1);
    }
}
