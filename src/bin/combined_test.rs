//! Combined SMT x Prefetch Matrix
//!
//! Crosses thread placement (single, same-core SMT siblings, different cores)
//! with software prefetch on/off on a streaming read+write workload, to see
//! whether prefetch can compensate for shared-cache contention.

use std::process::exit;

use log::error;
use smt_cache_lab::affinity::{diff_core_pair, same_core_pair};
use smt_cache_lab::arena::Arena;
use smt_cache_lab::driver::{run_workers, AffinityPolicy, WorkerSpec};
use smt_cache_lab::error::Result;
use smt_cache_lab::format_size;
use smt_cache_lab::prefetch::PrefetchHint;
use smt_cache_lab::workload::stream_rw;

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 32 MiB per thread.
const ARRAY_BYTES: usize = 32 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / 8;
const PREFETCH_DISTANCE: usize = 16;

fn lookahead(use_prefetch: bool) -> Option<(usize, PrefetchHint)> {
    use_prefetch.then_some((PREFETCH_DISTANCE, PrefetchHint::Nearest))
}

fn make_array(fill: u64) -> Result<Arena<u64>> {
    Arena::from_fn(ELEMENTS, |_| fill)
}

fn run_single(use_prefetch: bool) -> Result<f64> {
    let mut array = make_array(0x5555_5555_5555_5555)?;
    let specs = vec![WorkerSpec::new("single", 0, move || {
        stream_rw(array.as_mut_slice(), lookahead(use_prefetch))
    })];
    let report = run_workers(specs, AffinityPolicy::Required)?;
    Ok(report.workers[0].elapsed.as_secs_f64())
}

fn run_dual(cpu1: usize, cpu2: usize, use_prefetch: bool) -> Result<f64> {
    let mut array1 = make_array(0x5555_5555_5555_5555)?;
    let mut array2 = make_array(0xAAAA_AAAA_AAAA_AAAA)?;

    let specs = vec![
        WorkerSpec::new("thread0", cpu1, move || {
            stream_rw(array1.as_mut_slice(), lookahead(use_prefetch))
        }),
        WorkerSpec::new("thread1", cpu2, move || {
            stream_rw(array2.as_mut_slice(), lookahead(use_prefetch))
        }),
    ];
    let report = run_workers(specs, AffinityPolicy::Required)?;
    Ok(report.wall_secs())
}

fn run() -> Result<()> {
    let (same0, same1) = same_core_pair();
    let (diff0, diff1) = diff_core_pair();

    println!("\n{:<32} {:>12} {:>12}", "Configuration", "No Prefetch", "Prefetch");
    println!("{:-<32} {:-<12} {:-<12}", "", "", "");

    let single_np = run_single(false)?;
    let single_p = run_single(true)?;
    println!("{:<32} {single_np:>10.4}s {single_p:>10.4}s", "Single thread (CPU 0)");

    let same_np = run_dual(same0, same1, false)?;
    let same_p = run_dual(same0, same1, true)?;
    println!(
        "{:<32} {same_np:>10.4}s {same_p:>10.4}s",
        format!("Same core HT (CPU {same0},{same1})")
    );

    let diff_np = run_dual(diff0, diff1, false)?;
    let diff_p = run_dual(diff0, diff1, true)?;
    println!(
        "{:<32} {diff_np:>10.4}s {diff_p:>10.4}s",
        format!("Different cores (CPU {diff0},{diff1})")
    );

    println!("\n=== Analysis ===");
    println!("Prefetch speedup, single:      {:.2}x", single_np / single_p);
    println!("Prefetch speedup, same core:   {:.2}x", same_np / same_p);
    println!("Prefetch speedup, diff cores:  {:.2}x", diff_np / diff_p);
    println!();
    println!("If the same-core speedup exceeds the single-thread speedup, prefetch");
    println!("is hiding latency that SMT cache contention introduced.");
    Ok(())
}

fn main() {
    env_logger::init();

    if std::env::args().nth(1).is_some() {
        println!("Usage: combined_test");
        exit(1);
    }

    println!("=== Combined SMT + Prefetch Test ===");
    println!("Array size: {} per thread", format_size(ARRAY_BYTES as f64));
    println!("Prefetch distance: {PREFETCH_DISTANCE} elements");

    if let Err(e) = run() {
        error!("run failed: {e}");
        exit(2);
    }
}
