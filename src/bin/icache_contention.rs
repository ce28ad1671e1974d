//! L1 Instruction-Cache Contention
//!
//! Two threads chain indirect calls through disjoint tables of compiled
//! function variants. SMT siblings share one L1i, so running group A and
//! group B on the same core thrashes it with two unrelated instruction
//! footprints.

use std::process::exit;

use log::error;
use smt_cache_lab::affinity::{diff_core_pair, same_core_pair};
use smt_cache_lab::cli::Mode;
use smt_cache_lab::driver::{run_workers, AffinityPolicy, WorkerSpec};
use smt_cache_lab::error::Result;
use smt_cache_lab::workload::{instr_stream, InstrGroup, GROUP_VARIANTS};

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const ITERATIONS: usize = 50_000_000;

fn run_single() -> Result<()> {
    println!("\n=== Single Thread Test ===");

    let specs = vec![WorkerSpec::new("single", 0, || {
        instr_stream(InstrGroup::A, ITERATIONS)
    })];
    let report = run_workers(specs, AffinityPolicy::Required)?;

    let w = &report.workers[0];
    println!("Result: {}", w.checksum);
    println!("Time: {:.4} seconds", w.elapsed.as_secs_f64());
    Ok(())
}

fn run_dual(cpu1: usize, cpu2: usize, desc: &str) -> Result<()> {
    println!("\n=== {desc} ===");
    println!("CPU binding: Thread-A -> CPU{cpu1}, Thread-B -> CPU{cpu2}");

    let specs = vec![
        WorkerSpec::new("thread-a", cpu1, || instr_stream(InstrGroup::A, ITERATIONS)),
        WorkerSpec::new("thread-b", cpu2, || instr_stream(InstrGroup::B, ITERATIONS)),
    ];
    let report = run_workers(specs, AffinityPolicy::Required)?;

    println!(
        "Thread-A: Result={}, Time={:.4} sec",
        report.workers[0].checksum,
        report.workers[0].elapsed.as_secs_f64()
    );
    println!(
        "Thread-B: Result={}, Time={:.4} sec",
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
        Mode::Single => run_single(),
        Mode::SameCore => run_dual(
            same0,
            same1,
            &format!("Same Core HT (CPU {same0},{same1}) - I-Cache Contention"),
        ),
        Mode::DiffCore => run_dual(
            diff0,
            diff1,
            &format!("Different Cores (CPU {diff0},{diff1}) - Independent I-Caches"),
        ),
        Mode::All => {
            run_single()?;
            run_dual(
                same0,
                same1,
                &format!("Same Core HT (CPU {same0},{same1}) - I-Cache Contention"),
            )?;
            run_dual(
                diff0,
                diff1,
                &format!("Different Cores (CPU {diff0},{diff1}) - Independent I-Caches"),
            )?;

            println!("\n=== Analysis ===");
            println!("Expected: Same-core HT with different code paths should be SLOWER");
            println!("         due to L1 I-cache contention (thrashing)");
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
            println!("Usage: icache_contention {}", Mode::USAGE);
            exit(1);
        }
    };

    println!("=== I-Cache Contention Test ===");
    println!("Compiled variants per group: {GROUP_VARIANTS}");
    println!("Iterations: {ITERATIONS}");
    println!("L1 I-Cache: 32 KiB (shared by HT siblings)");

    if let Err(e) = run(mode) {
        error!("run failed: {e}");
        exit(2);
    }
}
