//! Experiment driver: composes workloads, affinity binding and the start-line
//! rendezvous into a measured multi-worker run.
//!
//! The driver never touches the arenas itself. It spawns one named OS thread
//! per worker spec, waits for all of them to pin and arrive at the start line,
//! releases them together, and collects per-worker elapsed times plus the
//! wall time from release to final join.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::affinity;
use crate::barrier::StartLine;
use crate::error::{Error, Result};
use crate::timing::Stopwatch;

/// How long the driver waits for all workers to reach the start line before
/// giving up. Bounded by thread startup latency, so this is generous.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether a refused affinity pin aborts the run or is merely logged.
///
/// Measurement runs want `Required`: one unpinned worker invalidates the whole
/// comparison. `BestEffort` exists for smoke tests and hosts where pinning is
/// unavailable (e.g. macOS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityPolicy {
    Required,
    BestEffort,
}

/// One worker: a name, a target logical CPU and the workload to time.
pub struct WorkerSpec {
    pub name: String,
    pub cpu: usize,
    pub work: Box<dyn FnOnce() -> u64 + Send>,
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>, cpu: usize, work: impl FnOnce() -> u64 + Send + 'static) -> Self {
        WorkerSpec {
            name: name.into(),
            cpu,
            work: Box::new(work),
        }
    }
}

/// Per-worker measurement, written once by the worker before it terminates.
#[derive(Debug)]
pub struct WorkerReport {
    pub name: String,
    pub cpu: usize,
    /// CPU the worker actually observed itself on after binding (diagnostic).
    pub observed_cpu: Option<usize>,
    pub checksum: u64,
    pub elapsed: Duration,
}

/// Outcome of one multi-worker run.
#[derive(Debug)]
pub struct RunReport {
    pub workers: Vec<WorkerReport>,
    /// Release-to-last-join wall time.
    pub wall: Duration,
}

impl RunReport {
    pub fn wall_secs(&self) -> f64 {
        self.wall.as_secs_f64()
    }

    pub fn max_worker_secs(&self) -> f64 {
        self.workers
            .iter()
            .map(|w| w.elapsed.as_secs_f64())
            .fold(0.0, f64::max)
    }

    /// Aggregate operations per second over the wall time.
    pub fn throughput(&self, total_ops: u64) -> f64 {
        total_ops as f64 / self.wall_secs()
    }
}

/// Run all workers simultaneously and collect their measurements.
///
/// Every worker binds its affinity, arrives at the start line and spins until
/// the driver releases the whole group at once; its timed region starts only
/// after release. Under [`AffinityPolicy::Required`] a failed pin makes the
/// worker skip its workload and fails the run after join.
pub fn run_workers(specs: Vec<WorkerSpec>, policy: AffinityPolicy) -> Result<RunReport> {
    if specs.is_empty() {
        return Err(Error::Config("no workers configured".into()));
    }
    if policy == AffinityPolicy::Required {
        let visible = affinity::num_cpus();
        for spec in &specs {
            if visible > 0 && spec.cpu >= visible {
                return Err(Error::Config(format!(
                    "worker '{}' targets CPU {} but only {} CPUs are visible",
                    spec.name, spec.cpu, visible
                )));
            }
        }
    }

    let n = specs.len();
    let line = Arc::new(StartLine::new());
    let mut handles = Vec::with_capacity(n);

    for spec in specs {
        let line = Arc::clone(&line);
        let handle = thread::Builder::new()
            .name(spec.name.clone())
            .spawn(move || worker_main(spec, &line, policy))
            .map_err(|e| Error::Config(format!("failed to spawn worker thread: {e}")))?;
        handles.push(handle);
    }

    let released_at = line.release(n, READY_TIMEOUT)?;
    info!("released {n} worker(s)");

    let mut workers = Vec::with_capacity(n);
    for handle in handles {
        let name = handle.thread().name().unwrap_or("<unnamed>").to_owned();
        let report = handle
            .join()
            .map_err(|_| Error::WorkerPanic { worker: name })??;
        workers.push(report);
    }
    let wall = released_at.elapsed();

    Ok(RunReport { workers, wall })
}

fn worker_main(
    spec: WorkerSpec,
    line: &StartLine,
    policy: AffinityPolicy,
) -> Result<WorkerReport> {
    let bind_result = affinity::bind(spec.cpu);
    if let Err(ref e) = bind_result {
        warn!("worker '{}': {e}", spec.name);
    }

    if thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max).is_err() {
        warn!("couldn't set worker '{}' to maximum thread priority", spec.name);
    }

    // Arrive even when binding failed, so the driver's release can't hang on
    // a missing arrival.
    line.arrive();

    if policy == AffinityPolicy::Required {
        bind_result?;
    }

    let sw = Stopwatch::start();
    let checksum = (spec.work)();
    let elapsed = sw.elapsed();

    let observed_cpu = affinity::current_cpu();
    info!(
        "worker '{}' done on CPU {:?}: checksum={checksum:#x}, elapsed={:.4}s",
        spec.name,
        observed_cpu,
        elapsed.as_secs_f64()
    );

    Ok(WorkerReport {
        name: spec.name,
        cpu: spec.cpu,
        observed_cpu,
        checksum,
        elapsed,
    })
}
