//! # smt-cache-lab
//!
//! Microbenchmarks for how CPU cache topology (shared L1/L2 between SMT
//! siblings vs independent caches across cores) and software prefetch hints
//! affect memory-bound and compute-bound workloads.
//!
//! The reusable harness lives here: CPU pinning ([`affinity`]), the two-phase
//! ready/start rendezvous ([`barrier`]), monotonic timing ([`timing`]),
//! cache-layout and prefetch primitives ([`layout`], [`prefetch`]), aligned
//! arenas ([`arena`]) and the multi-worker experiment driver ([`driver`]).
//! The binaries under `src/bin/` compose these with the [`workload`] library
//! into the individual experiments.

pub mod affinity;
pub mod arena;
pub mod barrier;
pub mod cli;
pub mod driver;
pub mod error;
pub mod layout;
pub mod prefetch;
pub mod timing;
pub mod workload;

/// Convert number of bytes to formatted string
pub fn format_size(bytes: f64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const KB: f64 = 1024.0;

    if bytes >= GB {
        format!("{:.2} GiB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MiB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KiB", bytes / KB)
    } else {
        format!("{:.2} B", bytes)
    }
}

/// Bandwidth in GiB/s for `bytes` moved in `secs`.
pub fn gib_per_sec(bytes: u64, secs: f64) -> f64 {
    bytes as f64 / secs / (1024.0 * 1024.0 * 1024.0)
}

/// Throughput in millions of operations per second.
pub fn mops_per_sec(ops: u64, secs: f64) -> f64 {
    ops as f64 / secs / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_picks_sane_units() {
        assert_eq!(format_size(512.0), "512.00 B");
        assert_eq!(format_size(2048.0), "2.00 KiB");
        assert_eq!(format_size(8.0 * 1024.0 * 1024.0), "8.00 MiB");
        assert_eq!(format_size(3.0 * 1024.0 * 1024.0 * 1024.0), "3.00 GiB");
    }

    #[test]
    fn throughput_helpers() {
        assert_eq!(gib_per_sec(1024 * 1024 * 1024, 2.0), 0.5);
        assert_eq!(mops_per_sec(5_000_000, 1.0), 5.0);
    }
}
