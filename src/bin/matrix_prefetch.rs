//! Matrix Multiply Prefetch
//!
//! 1024x1024 f64 multiply four ways: naive, naive+prefetch, cache-blocked,
//! and blocked+prefetch. Blocking restructures for locality; prefetch hides
//! the latency of the misses that remain.

use std::process::exit;

use log::error;
use smt_cache_lab::error::Result;
use smt_cache_lab::timing::Stopwatch;
use smt_cache_lab::workload::{
    matmul_blocked, matmul_blocked_prefetch, matmul_naive, matmul_prefetch, Matrix,
};
use smt_cache_lab::affinity;

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const N: usize = 1024;
const BLOCK_SIZE: usize = 64;

fn run_test(
    a: &Matrix,
    b: &Matrix,
    c: &mut Matrix,
    name: &str,
    multiply: impl FnOnce(&Matrix, &Matrix, &mut Matrix),
) {
    println!("\n=== {name} ===");
    c.zero();

    let sw = Stopwatch::start();
    multiply(a, b, c);
    let elapsed = sw.elapsed_secs();

    // 2*N^3 floating point operations per multiply
    let gflops = 2.0 * (N as f64).powi(3) / elapsed / 1e9;
    println!("Time: {elapsed:.4} seconds");
    println!("Performance: {gflops:.2} GFLOPS");
    println!("Checksum: {:#x}", c.checksum());
}

enum TestMode {
    Naive,
    Prefetch,
    Blocked,
    BlockedPrefetch,
    All,
}

fn parse_mode() -> std::result::Result<TestMode, String> {
    match std::env::args().nth(1).as_deref() {
        None | Some("--all") => Ok(TestMode::All),
        Some("--naive") => Ok(TestMode::Naive),
        Some("--prefetch") => Ok(TestMode::Prefetch),
        Some("--blocked") => Ok(TestMode::Blocked),
        Some("--blocked-prefetch") => Ok(TestMode::BlockedPrefetch),
        Some(other) => Err(other.to_string()),
    }
}

fn run(mode: TestMode) -> Result<()> {
    let a = Matrix::filled(N, 1.0)?;
    let b = Matrix::filled(N, 2.0)?;
    let mut c = Matrix::zeroed(N)?;
    affinity::bind(0)?;

    match mode {
        TestMode::Naive => run_test(&a, &b, &mut c, "Naive", matmul_naive),
        TestMode::Prefetch => run_test(&a, &b, &mut c, "Naive + Prefetch", matmul_prefetch),
        TestMode::Blocked => run_test(&a, &b, &mut c, "Blocked", |a, b, c| {
            matmul_blocked(a, b, c, BLOCK_SIZE)
        }),
        TestMode::BlockedPrefetch => {
            run_test(&a, &b, &mut c, "Blocked + Prefetch", |a, b, c| {
                matmul_blocked_prefetch(a, b, c, BLOCK_SIZE)
            })
        }
        TestMode::All => {
            run_test(&a, &b, &mut c, "Naive", matmul_naive);
            run_test(&a, &b, &mut c, "Naive + Prefetch", matmul_prefetch);
            run_test(&a, &b, &mut c, "Blocked", |a, b, c| {
                matmul_blocked(a, b, c, BLOCK_SIZE)
            });
            run_test(&a, &b, &mut c, "Blocked + Prefetch", |a, b, c| {
                matmul_blocked_prefetch(a, b, c, BLOCK_SIZE)
            });

            println!("\n=== Analysis ===");
            println!("Naive: column walks of B miss on every element");
            println!("Prefetch: hides part of the miss latency, same access order");
            println!("Blocked: restructures the loops so tiles stay cache-resident");
            println!("Identical checksums confirm the variants compute the same product");
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let mode = match parse_mode() {
        Ok(mode) => mode,
        Err(arg) => {
            println!("Unrecognized mode '{arg}'");
            println!(
                "Usage: matrix_prefetch [--naive | --prefetch | --blocked | --blocked-prefetch | --all]"
            );
            exit(1);
        }
    };

    println!("=== Matrix Multiply Prefetch Test ===");
    println!("Matrix: {N}x{N} f64 ({} MiB each)", N * N * 8 / (1024 * 1024));
    println!("Block size: {BLOCK_SIZE}");

    if let Err(e) = run(mode) {
        error!("run failed: {e}");
        exit(2);
    }
}
