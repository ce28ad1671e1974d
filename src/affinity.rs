//! CPU affinity binding and logical-CPU topology.
//!
//! Pins the calling thread to a single logical CPU via `core_affinity`, the
//! same mechanism used for thread-per-core pinning elsewhere. A failed pin is
//! an error for the caller to handle: an unpinned worker produces timings that
//! cannot be compared against pinned ones.
//!
//! The hyper-thread pair table matches an 8-core/16-thread part where logical
//! CPUs n and n+8 are SMT siblings on physical core n (e.g. AMD Ryzen 7
//! 8845HS). Adjust `HT_PAIRS` when running on a different topology.

use log::debug;

use crate::error::{Error, Result};

/// SMT sibling pairs: `HT_PAIRS[core]` are the two logical CPUs sharing
/// physical core `core` (and with it L1/L2 cache).
pub const HT_PAIRS: [[usize; 2]; 8] = [
    [0, 8],
    [1, 9],
    [2, 10],
    [3, 11],
    [4, 12],
    [5, 13],
    [6, 14],
    [7, 15],
];

/// Two logical CPUs on the same physical core (SMT siblings, shared L1/L2).
pub fn same_core_pair() -> (usize, usize) {
    (HT_PAIRS[0][0], HT_PAIRS[0][1])
}

/// Two logical CPUs on different physical cores (independent L1/L2).
pub fn diff_core_pair() -> (usize, usize) {
    (HT_PAIRS[0][0], HT_PAIRS[1][0])
}

/// Number of logical CPUs visible to this process.
pub fn num_cpus() -> usize {
    core_affinity::get_core_ids().map_or(0, |ids| ids.len())
}

/// Restrict the calling thread to logical CPU `cpu_id`.
///
/// Fails if `cpu_id` is not a visible CPU or the OS refuses the mask. Callers
/// must treat a failure as invalidating their measurement rather than silently
/// running unpinned.
pub fn bind(cpu_id: usize) -> Result<()> {
    let visible = num_cpus();
    if visible > 0 && cpu_id >= visible {
        return Err(Error::Config(format!(
            "CPU id {cpu_id} out of range (0..{visible})"
        )));
    }

    if !core_affinity::set_for_current(core_affinity::CoreId { id: cpu_id }) {
        return Err(Error::Binding {
            worker: std::thread::current().name().unwrap_or("<unnamed>").to_string(),
            cpu: cpu_id,
        });
    }

    debug!(
        "bound thread '{}' to CPU {} (now on {:?})",
        std::thread::current().name().unwrap_or("<unnamed>"),
        cpu_id,
        current_cpu()
    );
    Ok(())
}

/// Logical CPU the caller is presently executing on. Diagnostic only; the
/// scheduler may migrate an unpinned thread immediately after this returns.
#[cfg(target_os = "linux")]
pub fn current_cpu() -> Option<usize> {
    let cpu = unsafe { libc::sched_getcpu() };
    (cpu >= 0).then(|| cpu as usize)
}

#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ht_pairs_cover_distinct_cpus() {
        let mut seen = std::collections::HashSet::new();
        for pair in HT_PAIRS {
            assert!(seen.insert(pair[0]));
            assert!(seen.insert(pair[1]));
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn placement_helpers_disagree_on_second_cpu() {
        let (a0, a1) = same_core_pair();
        let (b0, b1) = diff_core_pair();
        assert_eq!(a0, b0);
        assert_ne!(a1, b1);
    }

    #[test]
    fn out_of_range_cpu_is_config_error() {
        match bind(usize::MAX) {
            Err(Error::Config(_)) => {}
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
