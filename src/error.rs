//! Error taxonomy for the experiment harness.
//!
//! Nothing here is retriable: these are one-shot measurement tools, so every
//! error ends the affected run and is reported to the user once.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid CLI mode or out-of-range CPU id. Reported via usage text,
    /// process exits non-zero.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Arena allocation failure.
    #[error("failed to allocate {bytes} bytes for arena")]
    Resource { bytes: usize },

    /// Affinity pinning was refused by the OS. An unpinned worker invalidates
    /// the whole comparison, so this is fatal for the run.
    #[error("could not pin thread '{worker}' to CPU {cpu}")]
    Binding { worker: String, cpu: usize },

    /// A worker's workload panicked. The default panic hook has already
    /// printed the payload; the run's measurements are void.
    #[error("worker thread '{worker}' panicked")]
    WorkerPanic { worker: String },

    /// A worker never reached the ready state before the driver's deadline.
    #[error("barrier timed out after {timeout:?}: {ready} of {expected} workers ready")]
    BarrierTimeout {
        timeout: Duration,
        ready: usize,
        expected: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
