//! Latency Hiding
//!
//! One compute-bound thread (pure transcendental math) paired with one
//! memory-bound thread (random walks over a 64 MiB array). On SMT siblings
//! the compute thread can use the core's execution units while the memory
//! thread stalls on cache misses.

use std::process::exit;

use log::error;
use smt_cache_lab::affinity::{diff_core_pair, same_core_pair};
use smt_cache_lab::arena::Arena;
use smt_cache_lab::cli::Mode;
use smt_cache_lab::driver::{run_workers, AffinityPolicy, WorkerSpec};
use smt_cache_lab::error::Result;
use smt_cache_lab::format_size;
use smt_cache_lab::workload::{compute_bound, memory_bound};

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 64 MiB: far beyond every cache level.
const ARRAY_BYTES: usize = 64 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / 8;
const COMPUTE_ITERATIONS: usize = 10_000_000;
const MEMORY_ACCESSES: usize = 5_000_000;
const SEED: u64 = 12_345;

fn make_array() -> Result<Arena<u64>> {
    Arena::from_fn(ELEMENTS, |_| 0x5555_5555_5555_5555)
}

fn run_single_both() -> Result<()> {
    println!("\n=== Single Thread - Both Tasks Serial ===");

    let mut array = make_array()?;
    let specs = vec![WorkerSpec::new("serial", 0, move || {
        let r1 = compute_bound(COMPUTE_ITERATIONS);
        let r2 = memory_bound(array.as_mut_slice(), MEMORY_ACCESSES, SEED);
        r1.wrapping_add(r2)
    })];
    let report = run_workers(specs, AffinityPolicy::Required)?;

    let w = &report.workers[0];
    println!("Combined result: {}", w.checksum);
    println!("Total time: {:.4} sec", w.elapsed.as_secs_f64());
    Ok(())
}

fn run_dual(cpu1: usize, cpu2: usize, desc: &str) -> Result<()> {
    println!("\n=== {desc} ===");
    println!("Compute thread -> CPU{cpu1}, Memory thread -> CPU{cpu2}");

    let mut array = make_array()?;
    let specs = vec![
        WorkerSpec::new("compute", cpu1, || compute_bound(COMPUTE_ITERATIONS)),
        WorkerSpec::new("memory", cpu2, move || {
            memory_bound(array.as_mut_slice(), MEMORY_ACCESSES, SEED)
        }),
    ];
    let report = run_workers(specs, AffinityPolicy::Required)?;

    println!(
        "Compute: Result={}, Time={:.4} sec",
        report.workers[0].checksum,
        report.workers[0].elapsed.as_secs_f64()
    );
    println!(
        "Memory:  Result={}, Time={:.4} sec",
        report.workers[1].checksum,
        report.workers[1].elapsed.as_secs_f64()
    );
    println!("Wall time: {:.4} seconds", report.wall_secs());
    Ok(())
}

fn run(mode: Mode) -> Result<()> {
    let (same0, same1) = same_core_pair();
    let (diff0, diff1) = diff_core_pair();

    match mode {
        Mode::Single => run_single_both(),
        Mode::SameCore => run_dual(
            same0,
            same1,
            &format!("Same Core HT (CPU {same0},{same1}) - Latency Hiding"),
        ),
        Mode::DiffCore => run_dual(
            diff0,
            diff1,
            &format!("Different Cores (CPU {diff0},{diff1}) - Full Parallelism"),
        ),
        Mode::All => {
            run_single_both()?;
            run_dual(
                same0,
                same1,
                &format!("Same Core HT (CPU {same0},{same1}) - Latency Hiding"),
            )?;
            run_dual(
                diff0,
                diff1,
                &format!("Different Cores (CPU {diff0},{diff1}) - Full Parallelism"),
            )?;

            println!("\n=== Analysis ===");
            println!("Compare 'Single Both' time with 'Same Core HT' wall time:");
            println!("- If HT is faster: latency hiding is effective");
            println!("- Memory thread stalls on cache misses let the compute thread run");
            println!();
            println!("Compare 'Same Core HT' with 'Different Cores':");
            println!("- Different cores should be fastest (true parallelism)");
            println!("- Same core HT trades off resources but hides latency");
            Ok(())
        }
    }
}

fn main() {
    env_logger::init();

    let mode = match Mode::from_args() {
        Ok(mode) => mode,
        Err(arg) => {
            println!("Unrecognized mode '{arg}'");
            println!("Usage: latency_hiding {}", Mode::USAGE);
            exit(1);
        }
    };

    println!("=== Latency Hiding Test ===");
    println!("Large array: {}", format_size(ARRAY_BYTES as f64));
    println!("Compute iterations: {COMPUTE_ITERATIONS}");
    println!("Memory accesses: {MEMORY_ACCESSES}");
    println!("\nHypothesis:");
    println!("- HT on same core: memory thread stalls -> compute thread uses the core");
    println!("- This latency hiding should improve total throughput");

    if let Err(e) = run(mode) {
        error!("run failed: {e}");
        exit(2);
    }
}
