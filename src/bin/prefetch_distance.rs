//! Prefetch Distance Sweep
//!
//! Random access with a software prefetch issued 0..256 accesses ahead.
//! Too close and the prefetch can't complete before the demand load; too far
//! and the line is evicted again before it is used.

use std::process::exit;

use log::error;
use smt_cache_lab::arena::Arena;
use smt_cache_lab::error::Result;
use smt_cache_lab::prefetch::PrefetchHint;
use smt_cache_lab::timing::Stopwatch;
use smt_cache_lab::workload::{random_sum_prefetch, Lcg};
use smt_cache_lab::{affinity, format_size, mops_per_sec};

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 64 MiB: far beyond every cache level.
const ARRAY_BYTES: usize = 64 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / 8;
const ACCESS_COUNT: usize = 5_000_000;
const DISTANCES: [usize; 10] = [0, 1, 2, 4, 8, 16, 32, 64, 128, 256];
const SEED: u64 = 54_321;

fn test_distance(array: &Arena<u64>, indices: &[usize], distance: usize) {
    array.flush_all();

    let sw = Stopwatch::start();
    let result = random_sum_prefetch(
        array.as_slice(),
        indices,
        ACCESS_COUNT,
        distance,
        PrefetchHint::Nearest,
    );
    let elapsed = sw.elapsed_secs();

    let latency_ns = elapsed / ACCESS_COUNT as f64 * 1e9;
    println!(
        "Distance {distance:>3}: Time={elapsed:.4}s, Throughput={:.2} M/s, Latency={latency_ns:.1} ns (result={})",
        mops_per_sec(ACCESS_COUNT as u64, elapsed),
        result % 1000
    );
}

fn run() -> Result<()> {
    let array = Arena::from_fn(ELEMENTS, |i| i as u64)?;
    let max_distance = DISTANCES[DISTANCES.len() - 1];
    let indices = Lcg::index_sequence(SEED, ACCESS_COUNT + max_distance, ELEMENTS);
    affinity::bind(0)?;

    println!(
        "{:<12} {:<10} {:<15} {:<12}",
        "Distance", "Time(s)", "Throughput(M/s)", "Latency(ns)"
    );
    println!("----------------------------------------------------");

    for distance in DISTANCES {
        test_distance(&array, &indices, distance);
    }

    println!("\n=== Analysis ===");
    println!("Distance 0: no prefetch (baseline)");
    println!("Too small (1-2): prefetch doesn't complete before the data is needed");
    println!("Optimal (8-32): prefetch completes just in time, best latency hiding");
    println!("Too large (64+): data may be evicted before use, wasting cache space");
    Ok(())
}

fn main() {
    env_logger::init();

    if std::env::args().nth(1).is_some() {
        println!("Usage: prefetch_distance");
        exit(1);
    }

    println!("=== Prefetch Distance Test ===");
    println!("Array size: {}", format_size(ARRAY_BYTES as f64));
    println!("Access count: {ACCESS_COUNT} (random, fixed seed {SEED})\n");
    println!("Testing different prefetch distances...\n");

    if let Err(e) = run() {
        error!("run failed: {e}");
        exit(2);
    }
}
