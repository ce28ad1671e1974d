//! False Sharing
//!
//! Four threads on four different cores each increment their own counter.
//! With the interleaved layout all four counters sit on one cache line and
//! every increment invalidates the line in the other cores; the padded layout
//! gives each counter its own line.

use std::process::exit;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::error;
use smt_cache_lab::driver::{run_workers, AffinityPolicy, WorkerSpec};
use smt_cache_lab::error::Result;
use smt_cache_lab::layout::{CounterBank, CounterLayout, CachePadded, CACHE_LINE_SIZE};
use smt_cache_lab::mops_per_sec;
use std::sync::atomic::AtomicU64;

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const NUM_THREADS: usize = 4;
const ITERATIONS: u64 = 100_000_000;
/// Different physical cores, maximizing cache-line ping-pong.
const CPUS: [usize; NUM_THREADS] = [0, 1, 2, 3];

fn run_test(layout: CounterLayout, desc: &str) -> Result<()> {
    println!("\n=== {desc} ===");

    let bank = Arc::new(CounterBank::new(layout, NUM_THREADS));
    let specs = (0..NUM_THREADS)
        .map(|id| {
            let bank = Arc::clone(&bank);
            WorkerSpec::new(format!("counter{id}"), CPUS[id], move || {
                let counter = bank.get(id);
                for _ in 0..ITERATIONS {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                counter.load(Ordering::Relaxed)
            })
        })
        .collect();

    let report = run_workers(specs, AffinityPolicy::Required)?;

    println!("Threads: {NUM_THREADS}, Iterations per thread: {ITERATIONS}");
    println!("Thread times:");
    for (i, w) in report.workers.iter().enumerate() {
        println!("  Thread {i}: {:.4} sec", w.elapsed.as_secs_f64());
        assert_eq!(w.checksum, ITERATIONS);
    }
    println!("Wall time: {:.4} seconds", report.wall_secs());
    println!(
        "Ops/sec: {:.2} M",
        mops_per_sec(ITERATIONS * NUM_THREADS as u64, report.wall_secs())
    );
    Ok(())
}

enum TestMode {
    Bad,
    Good,
    All,
}

fn parse_mode() -> std::result::Result<TestMode, String> {
    match std::env::args().nth(1).as_deref() {
        None | Some("--all") => Ok(TestMode::All),
        Some("--bad") => Ok(TestMode::Bad),
        Some("--good") => Ok(TestMode::Good),
        Some(other) => Err(other.to_string()),
    }
}

fn run(mode: TestMode) -> Result<()> {
    match mode {
        TestMode::Bad => run_test(CounterLayout::Interleaved, "Bad Design (False Sharing)"),
        TestMode::Good => run_test(CounterLayout::Padded, "Good Design (No False Sharing)"),
        TestMode::All => {
            run_test(CounterLayout::Interleaved, "Bad Design (False Sharing)")?;
            run_test(CounterLayout::Padded, "Good Design (No False Sharing)")?;

            println!("\n=== Analysis ===");
            println!("False sharing occurs when:");
            println!("- Multiple threads modify different variables");
            println!("- But those variables share the same cache line");
            println!("- Each write invalidates the line in other cores' caches");
            println!("\nSolution:");
            println!("- Pad each variable to its own cache line (CachePadded<T>)");
            Ok(())
        }
    }
}

fn main() {
    env_logger::init();

    let mode = match parse_mode() {
        Ok(mode) => mode,
        Err(arg) => {
            println!("Unrecognized mode '{arg}'");
            println!("Usage: false_sharing [--bad | --good | --all]");
            exit(1);
        }
    };

    println!("=== False Sharing Demonstration ===");
    println!("Cache line size: {CACHE_LINE_SIZE} bytes");
    println!();
    println!("Bad design: all counters share cache line(s)");
    println!(
        "  {NUM_THREADS} counters x {} bytes = {} bytes",
        std::mem::size_of::<AtomicU64>(),
        NUM_THREADS * std::mem::size_of::<AtomicU64>()
    );
    println!();
    println!("Good design: each counter has its own cache line");
    println!(
        "  {NUM_THREADS} counters x {} bytes = {} bytes",
        std::mem::size_of::<CachePadded<AtomicU64>>(),
        NUM_THREADS * std::mem::size_of::<CachePadded<AtomicU64>>()
    );

    if let Err(e) = run(mode) {
        error!("run failed: {e}");
        exit(2);
    }
}
