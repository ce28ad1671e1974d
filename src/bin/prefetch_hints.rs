//! Prefetch Hint Comparison
//!
//! Same sequential scan, once per prefetch locality hint (T0, T1, T2, NTA)
//! plus a no-prefetch baseline, each from a cold cache.

use std::process::exit;

use log::error;
use smt_cache_lab::arena::Arena;
use smt_cache_lab::error::Result;
use smt_cache_lab::prefetch::PrefetchHint;
use smt_cache_lab::timing::Stopwatch;
use smt_cache_lab::workload::{sequential_sum, sequential_sum_prefetch};
use smt_cache_lab::{affinity, format_size, gib_per_sec};

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 128 MiB: far beyond every cache level.
const ARRAY_BYTES: usize = 128 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / 8;
const ITERATIONS: usize = 3;
const PREFETCH_DISTANCE: usize = 16;

fn run_test(array: &Arena<u64>, name: &str, hint: Option<PrefetchHint>) {
    array.flush_all();

    let sw = Stopwatch::start();
    let result = match hint {
        None => sequential_sum(array.as_slice(), ITERATIONS),
        Some(hint) => {
            sequential_sum_prefetch(array.as_slice(), ITERATIONS, PREFETCH_DISTANCE, hint)
        }
    };
    let elapsed = sw.elapsed_secs();

    let total_bytes = (ARRAY_BYTES * ITERATIONS) as u64;
    println!(
        "{name:<20}: Time={elapsed:.4}s, BW={:.2} GB/s (result={})",
        gib_per_sec(total_bytes, elapsed),
        result % 1000
    );
}

fn run() -> Result<()> {
    let array = Arena::from_fn(ELEMENTS, |i| i as u64)?;
    affinity::bind(0)?;

    run_test(&array, "No Prefetch", None);
    run_test(&array, "Prefetch T0 (L1)", Some(PrefetchHint::Nearest));
    run_test(&array, "Prefetch T1 (L2)", Some(PrefetchHint::Mid));
    run_test(&array, "Prefetch T2 (L3)", Some(PrefetchHint::Far));
    run_test(&array, "Prefetch NTA", Some(PrefetchHint::NonTemporal));

    println!("\n=== Analysis ===");
    println!("T0: Best for data that will be reused soon");
    println!("    Brings data closest to the CPU (L1)\n");
    println!("T1/T2: Good for data with delayed reuse");
    println!("    Avoids polluting the L1 cache\n");
    println!("NTA: Best for streaming data (read once)");
    println!("    Minimizes cache pollution; data bypasses or quickly evicts from cache");
    Ok(())
}

fn main() {
    env_logger::init();

    if std::env::args().nth(1).is_some() {
        println!("Usage: prefetch_hints");
        exit(1);
    }

    println!("=== Prefetch Hints Comparison ===");
    println!("Array size: {}", format_size(ARRAY_BYTES as f64));
    println!("Iterations: {ITERATIONS}");
    println!("Prefetch distance: {PREFETCH_DISTANCE} elements\n");
    println!("Hint types:");
    println!("  T0  - Prefetch to all cache levels (L1, L2, L3)");
    println!("  T1  - Prefetch to L2 and above");
    println!("  T2  - Prefetch to L3 and above");
    println!("  NTA - Non-temporal (minimize cache pollution)\n");

    if let Err(e) = run() {
        error!("run failed: {e}");
        exit(2);
    }
}
