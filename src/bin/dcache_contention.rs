//! L1 Data-Cache Contention
//!
//! Two threads stride through separate 8 MiB arrays, one cache line per
//! access. SMT siblings share one L1d, so the same-core placement thrashes it;
//! separate physical cores keep their caches to themselves.

use std::process::exit;

use log::error;
use smt_cache_lab::affinity::{diff_core_pair, same_core_pair};
use smt_cache_lab::arena::Arena;
use smt_cache_lab::cli::Mode;
use smt_cache_lab::driver::{run_workers, AffinityPolicy, WorkerSpec};
use smt_cache_lab::error::Result;
use smt_cache_lab::workload::strided_rw;
use smt_cache_lab::{format_size, mops_per_sec};

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 8 MiB per array, far larger than a 32 KiB L1d.
const ARRAY_BYTES: usize = 8 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / 8;
const ITERATIONS: usize = 10;
/// One element per cache line's worth of stride, maximizing misses.
const STRIDE: usize = 64;

fn make_array(fill: u64) -> Result<Arena<u64>> {
    Arena::from_fn(ELEMENTS, |_| fill)
}

fn accesses_per_thread() -> u64 {
    (ELEMENTS.div_ceil(STRIDE) * ITERATIONS) as u64
}

fn run_single() -> Result<()> {
    println!("\n=== Single Thread Test ===");

    let mut array = make_array(0x5555_5555_5555_5555)?;
    let specs = vec![WorkerSpec::new("single", 0, move || {
        strided_rw(array.as_mut_slice(), ITERATIONS, STRIDE)
    })];
    let report = run_workers(specs, AffinityPolicy::Required)?;

    let w = &report.workers[0];
    println!("Result: {}", w.checksum);
    println!("Time: {:.4} seconds", w.elapsed.as_secs_f64());
    Ok(())
}

fn run_dual(cpu1: usize, cpu2: usize, desc: &str) -> Result<()> {
    println!("\n=== {desc} ===");
    println!("CPU binding: Thread0 -> CPU{cpu1}, Thread1 -> CPU{cpu2}");

    let mut array1 = make_array(0x5555_5555_5555_5555)?;
    let mut array2 = make_array(0xAAAA_AAAA_AAAA_AAAA)?;

    let specs = vec![
        WorkerSpec::new("thread0", cpu1, move || {
            strided_rw(array1.as_mut_slice(), ITERATIONS, STRIDE)
        }),
        WorkerSpec::new("thread1", cpu2, move || {
            strided_rw(array2.as_mut_slice(), ITERATIONS, STRIDE)
        }),
    ];
    let report = run_workers(specs, AffinityPolicy::Required)?;

    for (i, w) in report.workers.iter().enumerate() {
        println!(
            "Thread {i}: Result={}, Time={:.4} sec",
            w.checksum,
            w.elapsed.as_secs_f64()
        );
    }
    println!("Wall time: {:.4} seconds", report.wall_secs());
    println!(
        "Ops/sec: {:.2} M",
        mops_per_sec(accesses_per_thread() * 2, report.wall_secs())
    );
    Ok(())
}

fn run(mode: Mode) -> Result<()> {
    let (same0, same1) = same_core_pair();
    let (diff0, diff1) = diff_core_pair();

    match mode {
        Mode::Single => run_single(),
        Mode::SameCore => run_dual(
            same0,
            same1,
            &format!("Same Core HT (CPU {same0},{same1}) - Cache Contention"),
        ),
        Mode::DiffCore => run_dual(
            diff0,
            diff1,
            &format!("Different Cores (CPU {diff0},{diff1}) - Independent Caches"),
        ),
        Mode::All => {
            run_single()?;
            run_dual(
                same0,
                same1,
                &format!("Same Core HT (CPU {same0},{same1}) - Cache Contention"),
            )?;
            run_dual(
                diff0,
                diff1,
                &format!("Different Cores (CPU {diff0},{diff1}) - Independent Caches"),
            )?;

            println!("\n=== Analysis ===");
            println!("Expected: Same-core HT should be SLOWER due to L1 cache contention");
            println!("         Different-core should be faster (independent L1 caches)");
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
            println!("Usage: dcache_contention {}", Mode::USAGE);
            exit(1);
        }
    };

    println!("=== D-Cache Contention Test ===");
    println!("Array size: {} each", format_size(ARRAY_BYTES as f64));
    println!("L1 D-Cache: 32 KiB (shared by HT siblings)");
    println!("Stride: {STRIDE} elements ({} bytes)", STRIDE * 8);
    println!("Iterations: {ITERATIONS}");

    if let Err(e) = run(mode) {
        error!("run failed: {e}");
        exit(2);
    }
}
