//! End-to-end properties of the experiment harness: rendezvous correctness,
//! layout guarantees and measurement determinism, exercised through the same
//! driver the benchmark binaries use.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smt_cache_lab::arena::Arena;
use smt_cache_lab::barrier::StartLine;
use smt_cache_lab::driver::{run_workers, AffinityPolicy, WorkerSpec};
use smt_cache_lab::layout::{CounterBank, CounterLayout, CACHE_LINE_SIZE};
use smt_cache_lab::prefetch::{fence, flush, prefetch, PrefetchHint};
use smt_cache_lab::timing::Stopwatch;
use smt_cache_lab::workload::{sequential_sum, Lcg};

#[test]
fn no_worker_starts_before_release() {
    let line = Arc::new(StartLine::new());
    let n = 4;

    let workers: Vec<_> = (0..n)
        .map(|_| {
            let line = Arc::clone(&line);
            std::thread::spawn(move || {
                line.arrive();
                // First instruction of the "timed region".
                Instant::now()
            })
        })
        .collect();

    let released_at = line.release(n, Duration::from_secs(10)).unwrap();

    for w in workers {
        let first_timed_instant = w.join().unwrap();
        assert!(first_timed_instant >= released_at);
    }
    assert_eq!(line.ready_count(), n);
    assert!(line.is_released());
}

#[test]
fn two_worker_run_leaves_consistent_rendezvous_state() {
    let line = Arc::new(StartLine::new());
    let workers: Vec<_> = (0..2)
        .map(|i| {
            let line = Arc::clone(&line);
            std::thread::spawn(move || {
                line.arrive();
                let sw = Stopwatch::start();
                let data: Vec<u64> = (0..1024).collect();
                let sum = sequential_sum(&data, 10 + i);
                (sum, sw.elapsed())
            })
        })
        .collect();

    line.release(2, Duration::from_secs(10)).unwrap();

    for w in workers {
        let (_, elapsed) = w.join().unwrap();
        assert!(elapsed >= Duration::ZERO);
    }
    assert_eq!(line.ready_count(), 2);
    assert!(line.is_released());
}

#[test]
fn sequential_scan_of_large_array_matches_closed_form() {
    // 128 MiB of u64, value = index: one full pass sums 0..n-1.
    let elements = 128 * 1024 * 1024 / 8;
    let arena = Arena::from_fn(elements, |i| i as u64).unwrap();

    let sw = Stopwatch::start();
    let sum = sequential_sum(arena.as_slice(), 1);
    let elapsed = sw.elapsed_secs();

    let n = elements as u64;
    assert_eq!(sum, (n * (n - 1) / 2) as u64);
    assert!(elapsed > 0.0);
    assert!(elapsed.is_finite());
}

#[test]
fn repeated_measurement_stays_within_noise_band() {
    // Statistical property: the same workload twice on the same thread lands
    // within the same order of magnitude. The working set is sized so each
    // pass takes tens of milliseconds, keeping scheduler noise small.
    let arena = Arena::from_fn(1024 * 1024, |i| i as u64).unwrap();

    let sw = Stopwatch::start();
    let first_sum = sequential_sum(arena.as_slice(), 20);
    let first = sw.elapsed_secs();

    let sw = Stopwatch::start();
    let second_sum = sequential_sum(arena.as_slice(), 20);
    let second = sw.elapsed_secs();

    assert_eq!(first_sum, second_sum);
    let ratio = first / second;
    assert!(
        (0.5..=2.0).contains(&ratio),
        "elapsed ratio {ratio} outside noise band ({first}s vs {second}s)"
    );
}

#[test]
fn driver_run_with_two_workers_reports_everything() {
    let mut a = Arena::from_fn(64 * 1024, |i| i as u64).unwrap();
    let mut b = Arena::from_fn(64 * 1024, |i| (i * 2) as u64).unwrap();

    let specs = vec![
        WorkerSpec::new("w0", 0, move || {
            smt_cache_lab::workload::strided_rw(a.as_mut_slice(), 5, 64)
        }),
        WorkerSpec::new("w1", 0, move || {
            smt_cache_lab::workload::strided_rw(b.as_mut_slice(), 5, 64)
        }),
    ];
    let report = run_workers(specs, AffinityPolicy::BestEffort).unwrap();

    assert_eq!(report.workers.len(), 2);
    assert!(report.wall_secs() > 0.0);
    for w in &report.workers {
        assert!(w.elapsed >= Duration::ZERO);
    }
    // No aggregate can be shorter than the slowest worker.
    assert!(report.wall_secs() >= report.max_worker_secs() * 0.5);
}

#[test]
fn flush_prefetch_read_roundtrip_preserves_data() {
    let arena = Arena::from_fn(4096, |i| i as u64 ^ 0xDEAD).unwrap();
    let before: Vec<u64> = arena.as_slice().to_vec();

    for chunk in arena.as_slice().chunks(CACHE_LINE_SIZE / 8) {
        flush(chunk.as_ptr());
    }
    fence();
    for chunk in arena.as_slice().chunks(CACHE_LINE_SIZE / 8) {
        prefetch(chunk.as_ptr(), PrefetchHint::Nearest);
    }

    assert_eq!(arena.as_slice(), before.as_slice());
}

#[test]
fn padded_and_interleaved_banks_satisfy_layout_contracts() {
    let padded = CounterBank::new(CounterLayout::Padded, 8);
    for i in 0..8 {
        for j in 0..8 {
            if i != j {
                assert_ne!(
                    padded.addr_of(i) / CACHE_LINE_SIZE,
                    padded.addr_of(j) / CACHE_LINE_SIZE
                );
            }
        }
    }

    let interleaved = CounterBank::new(CounterLayout::Interleaved, 8);
    assert!(interleaved.stride() < CACHE_LINE_SIZE);

    // Both layouts count correctly regardless of where the values sit.
    for bank in [&padded, &interleaved] {
        bank.get(3).fetch_add(7, Ordering::Relaxed);
        assert_eq!(bank.get(3).load(Ordering::Relaxed), 7);
        assert_eq!(bank.get(2).load(Ordering::Relaxed), 0);
    }
}

#[test]
fn random_workloads_are_reproducible_end_to_end() {
    let arena = Arc::new(Arena::from_fn(64 * 1024, |i| (i * 31) as u64).unwrap());
    let indices = Arc::new(Lcg::index_sequence(12_345, 10_000 + 16, arena.len()));

    let run_once = || {
        let arena = Arc::clone(&arena);
        let indices = Arc::clone(&indices);
        let specs = vec![WorkerSpec::new("rand", 0, move || {
            smt_cache_lab::workload::random_sum(arena.as_slice(), &indices, 10_000)
        })];
        run_workers(specs, AffinityPolicy::BestEffort).unwrap().workers[0].checksum
    };

    assert_eq!(run_once(), run_once());
}
