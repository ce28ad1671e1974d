//! Workload library: the units of work the experiments time.
//!
//! Every workload is a pure function from (arena slices, optional prefetch
//! policy, iteration counts) to a `u64` checksum. None of them spawn threads,
//! bind CPUs or touch the barrier; that is the driver's job. Workloads with
//! random access patterns derive their indices from a fixed-seed LCG so two
//! runs touch the identical sequence of addresses.
//!
//! Several workloads write a running sum back into the array they scan. The
//! originals did this to keep the optimizer from deleting the loop; keep that
//! behavior, it is part of what gets timed.

use std::hint::black_box;

use crate::arena::Arena;
use crate::error::Result;
use crate::prefetch::{prefetch, PrefetchHint};

/// Fixed-seed linear congruential generator for reproducible random access
/// patterns (same constants as the classic C library rand).
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg { state: seed }
    }

    pub fn next_index(&mut self, modulus: usize) -> usize {
        self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        ((self.state >> 16) as usize) % modulus
    }

    /// Pre-generate `count` indices in `0..modulus`.
    pub fn index_sequence(seed: u64, count: usize, modulus: usize) -> Vec<usize> {
        let mut rng = Lcg::new(seed);
        (0..count).map(|_| rng.next_index(modulus)).collect()
    }
}

/// Sequential read-only scan; `iters` full passes over the array.
pub fn sequential_sum(data: &[u64], iters: usize) -> u64 {
    let mut sum = 0u64;
    for _ in 0..iters {
        for &v in data {
            sum = sum.wrapping_add(v);
        }
    }
    black_box(sum)
}

/// Sequential scan issuing a software prefetch `distance` elements ahead.
pub fn sequential_sum_prefetch(
    data: &[u64],
    iters: usize,
    distance: usize,
    hint: PrefetchHint,
) -> u64 {
    let mut sum = 0u64;
    let ptr = data.as_ptr();
    for _ in 0..iters {
        for i in 0..data.len() {
            // Prefetching past the end is harmless, skip the bounds juggling.
            prefetch(ptr.wrapping_add(i + distance), hint);
            sum = sum.wrapping_add(data[i]);
        }
    }
    black_box(sum)
}

/// Strided read+write scan: touch one element per `stride`, writing the
/// running sum back. Large strides hit a new cache line on every access,
/// maximizing L1d pressure.
pub fn strided_rw(data: &mut [u64], iters: usize, stride: usize) -> u64 {
    let mut sum = 0u64;
    for _ in 0..iters {
        let mut i = 0;
        while i < data.len() {
            sum = sum.wrapping_add(data[i]);
            data[i] = sum;
            i += stride;
        }
    }
    black_box(sum)
}

/// Sequential read+write over `range`, `iters` passes. Small working sets of
/// this shape stay L1-resident, which is what the shared-cache cooperation
/// experiment wants.
pub fn sequential_rw(data: &mut [u64], range: std::ops::Range<usize>, iters: usize) -> u64 {
    let mut sum = 0u64;
    for _ in 0..iters {
        for i in range.clone() {
            sum = sum.wrapping_add(data[i]);
            data[i] = sum & 0xFF;
        }
    }
    black_box(sum)
}

/// Random reads through a pre-generated index table.
pub fn random_sum(data: &[u64], indices: &[usize], count: usize) -> u64 {
    let mut sum = 0u64;
    for &idx in &indices[..count] {
        sum = sum.wrapping_add(data[idx]);
    }
    black_box(sum)
}

/// Random reads, prefetching the element `distance` accesses ahead in the
/// index table.
pub fn random_sum_prefetch(
    data: &[u64],
    indices: &[usize],
    count: usize,
    distance: usize,
    hint: PrefetchHint,
) -> u64 {
    debug_assert!(indices.len() >= count + distance);
    let mut sum = 0u64;
    for i in 0..count {
        if distance > 0 {
            prefetch(&data[indices[i + distance]], hint);
        }
        sum = sum.wrapping_add(data[indices[i]]);
    }
    black_box(sum)
}

/// Random reads with two prefetch streams: a near one into L1 and a far one
/// into L2, hiding latency at two horizons.
pub fn random_sum_multi_prefetch(data: &[u64], indices: &[usize], count: usize) -> u64 {
    const NEAR: usize = 4;
    const FAR: usize = 16;
    debug_assert!(indices.len() >= count + FAR);
    let mut sum = 0u64;
    for i in 0..count {
        prefetch(&data[indices[i + NEAR]], PrefetchHint::Nearest);
        prefetch(&data[indices[i + FAR]], PrefetchHint::Mid);
        sum = sum.wrapping_add(data[indices[i]]);
    }
    black_box(sum)
}

/// Streaming read+write pass, optionally with a prefetch lookahead.
pub fn stream_rw(data: &mut [u64], lookahead: Option<(usize, PrefetchHint)>) -> u64 {
    let mut sum = 0u64;
    let ptr = data.as_ptr();
    for i in 0..data.len() {
        if let Some((distance, hint)) = lookahead {
            prefetch(ptr.wrapping_add(i + distance), hint);
        }
        sum = sum.wrapping_add(data[i]);
        data[i] = sum & 0xFF;
    }
    black_box(sum)
}

/// Compute-bound chain of transcendental math with no memory traffic, for the
/// latency-hiding experiment's ALU-side thread.
pub fn compute_bound(iters: usize) -> u64 {
    let mut x = 1.0f64;
    for _ in 0..iters {
        x = x.sin() * x.cos() + (x.abs() + 1.0).sqrt();
        x = (x.abs() + 1.0).ln() * (-x.abs() * 0.001).exp();
    }
    black_box((x * 1_000_000.0) as u64)
}

/// Memory-bound random read+write walk over a large array, for the
/// latency-hiding experiment's stalled-side thread.
pub fn memory_bound(data: &mut [u64], accesses: usize, seed: u64) -> u64 {
    let mut rng = Lcg::new(seed);
    let mut sum = 0u64;
    for _ in 0..accesses {
        let idx = rng.next_index(data.len());
        sum = sum.wrapping_add(data[idx]);
        data[idx] = sum;
    }
    black_box(sum)
}

// ---------------------------------------------------------------------------
// Dense matrix multiply
// ---------------------------------------------------------------------------

/// Square row-major f64 matrix backed by a cache-line-aligned arena.
pub struct Matrix {
    n: usize,
    data: Arena<f64>,
}

impl Matrix {
    pub fn zeroed(n: usize) -> Result<Self> {
        Ok(Matrix {
            n,
            data: Arena::zeroed(n * n)?,
        })
    }

    /// `M[i][j] = base + ((i*n + j) % 100) * 0.01`, matching the experiment's
    /// deterministic fill pattern.
    pub fn filled(n: usize, base: f64) -> Result<Self> {
        let mut m = Self::zeroed(n)?;
        for (i, v) in m.data.as_mut_slice().iter_mut().enumerate() {
            *v = base + (i % 100) as f64 * 0.01;
        }
        Ok(m)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn as_slice(&self) -> &[f64] {
        self.data.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        self.data.as_mut_slice()
    }

    pub fn zero(&mut self) {
        self.data.as_mut_slice().fill(0.0);
    }

    /// Bit-stable checksum over all elements.
    pub fn checksum(&self) -> u64 {
        let mut acc = 0u64;
        for &v in self.data.as_slice() {
            acc = acc.rotate_left(1) ^ v.to_bits();
        }
        acc
    }
}

/// Textbook i-j-k multiply, no cache awareness.
pub fn matmul_naive(a: &Matrix, b: &Matrix, c: &mut Matrix) {
    let n = a.n();
    let (a, b) = (a.as_slice(), b.as_slice());
    let c = c.as_mut_slice();
    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..n {
                sum += a[i * n + k] * b[k * n + j];
            }
            c[i * n + j] = sum;
        }
    }
}

/// Naive order with software prefetch of the next A row and upcoming B rows.
pub fn matmul_prefetch(a: &Matrix, b: &Matrix, c: &mut Matrix) {
    let n = a.n();
    let (a_s, b_s) = (a.as_slice(), b.as_slice());
    let c = c.as_mut_slice();
    for i in 0..n {
        for j in 0..n {
            if j == 0 && i + 1 < n {
                let mut p = 0;
                while p < n {
                    prefetch(&a_s[(i + 1) * n + p], PrefetchHint::Nearest);
                    p += 8;
                }
            }
            let mut sum = 0.0;
            for k in 0..n {
                if k + 8 < n {
                    prefetch(&b_s[(k + 8) * n + j], PrefetchHint::Nearest);
                }
                sum += a_s[i * n + k] * b_s[k * n + j];
            }
            c[i * n + j] = sum;
        }
    }
}

/// Cache-blocked multiply; `block` bounds each tile's working set.
pub fn matmul_blocked(a: &Matrix, b: &Matrix, c: &mut Matrix, block: usize) {
    let n = a.n();
    let (a, b) = (a.as_slice(), b.as_slice());
    let c = c.as_mut_slice();
    for ii in (0..n).step_by(block) {
        for jj in (0..n).step_by(block) {
            for kk in (0..n).step_by(block) {
                for i in ii..(ii + block).min(n) {
                    for j in jj..(jj + block).min(n) {
                        let mut sum = c[i * n + j];
                        for k in kk..(kk + block).min(n) {
                            sum += a[i * n + k] * b[k * n + j];
                        }
                        c[i * n + j] = sum;
                    }
                }
            }
        }
    }
}

/// Blocked multiply that prefetches the next A and B tiles while the current
/// one is being consumed.
pub fn matmul_blocked_prefetch(a: &Matrix, b: &Matrix, c: &mut Matrix, block: usize) {
    let n = a.n();
    let (a_s, b_s) = (a.as_slice(), b.as_slice());
    let c = c.as_mut_slice();
    for ii in (0..n).step_by(block) {
        for jj in (0..n).step_by(block) {
            if jj + block < n {
                for p in 0..block.min(n) {
                    prefetch(&b_s[p * n + jj + block], PrefetchHint::Nearest);
                }
            }
            for kk in (0..n).step_by(block) {
                if kk + block < n {
                    for p in ii..(ii + block).min(n) {
                        prefetch(&a_s[p * n + kk + block], PrefetchHint::Nearest);
                    }
                }
                for i in ii..(ii + block).min(n) {
                    for j in jj..(jj + block).min(n) {
                        let mut sum = c[i * n + j];
                        for k in kk..(kk + block).min(n) {
                            sum += a_s[i * n + k] * b_s[k * n + j];
                        }
                        c[i * n + j] = sum;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Instruction-stream pressure
// ---------------------------------------------------------------------------

/// Which of the two disjoint instruction-stream groups to execute. Two SMT
/// siblings running different groups never share L1i-resident code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrGroup {
    A,
    B,
}

/// Distinct compiled specializations per group. Each variant is an
/// `#[inline(never)]` monomorphization, so the group's total instruction
/// footprint scales with this count.
pub const GROUP_VARIANTS: usize = 100;

#[inline(never)]
fn variant_a<const K: u64>(x: u64) -> u64 {
    let mut y = x.wrapping_mul(17).wrapping_add(K);
    y = (y << 3) ^ (y >> 5);
    y = y.wrapping_add(K.wrapping_mul(31));
    y = y.wrapping_mul(0x1_2345_6789) ^ K;
    y = y.rotate_left(7);
    y.wrapping_add(K.wrapping_mul(13))
}

#[inline(never)]
fn variant_b<const K: u64>(x: u64) -> u64 {
    let mut y = x.wrapping_add(K.wrapping_mul(23));
    y = (y >> 4) ^ (y << 6);
    y = y.wrapping_sub(K.wrapping_mul(17));
    y = y.wrapping_mul(0x9_8765_4321).wrapping_add(K);
    y = y.rotate_right(8);
    y.wrapping_sub(K.wrapping_mul(11))
}

macro_rules! variant_table {
    ($f:ident; $($k:literal)*) => {
        [$($f::<$k> as fn(u64) -> u64),*]
    };
}

static TABLE_A: [fn(u64) -> u64; GROUP_VARIANTS] = variant_table!(variant_a;
    0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19
    20 21 22 23 24 25 26 27 28 29 30 31 32 33 34 35 36 37 38 39
    40 41 42 43 44 45 46 47 48 49 50 51 52 53 54 55 56 57 58 59
    60 61 62 63 64 65 66 67 68 69 70 71 72 73 74 75 76 77 78 79
    80 81 82 83 84 85 86 87 88 89 90 91 92 93 94 95 96 97 98 99);

static TABLE_B: [fn(u64) -> u64; GROUP_VARIANTS] = variant_table!(variant_b;
    0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19
    20 21 22 23 24 25 26 27 28 29 30 31 32 33 34 35 36 37 38 39
    40 41 42 43 44 45 46 47 48 49 50 51 52 53 54 55 56 57 58 59
    60 61 62 63 64 65 66 67 68 69 70 71 72 73 74 75 76 77 78 79
    80 81 82 83 84 85 86 87 88 89 90 91 92 93 94 95 96 97 98 99);

/// Chain `iters` indirect calls round-robin through the group's variant
/// table, touching the group's whole instruction footprint.
pub fn instr_stream(group: InstrGroup, iters: usize) -> u64 {
    let table = match group {
        InstrGroup::A => &TABLE_A,
        InstrGroup::B => &TABLE_B,
    };
    let mut result = 1u64;
    for i in 0..iters {
        result = table[i % GROUP_VARIANTS](result);
    }
    black_box(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcg_sequences_are_deterministic() {
        let a = Lcg::index_sequence(12_345, 10_000, 4096);
        let b = Lcg::index_sequence(12_345, 10_000, 4096);
        assert_eq!(a, b);
        assert!(a.iter().all(|&i| i < 4096));

        let c = Lcg::index_sequence(54_321, 10_000, 4096);
        assert_ne!(a, c);
    }

    #[test]
    fn sequential_sum_matches_closed_form() {
        let n = 64 * 1024u64;
        let data: Vec<u64> = (0..n).collect();
        assert_eq!(sequential_sum(&data, 1), n * (n - 1) / 2);
    }

    #[test]
    fn prefetch_variants_match_plain_sum() {
        let data: Vec<u64> = (0..8192).map(|i| i * 7 + 1).collect();
        let plain = sequential_sum(&data, 3);
        for hint in [
            PrefetchHint::Nearest,
            PrefetchHint::Mid,
            PrefetchHint::Far,
            PrefetchHint::NonTemporal,
        ] {
            assert_eq!(sequential_sum_prefetch(&data, 3, 16, hint), plain);
        }
    }

    #[test]
    fn random_sum_is_bit_identical_across_runs() {
        let data: Vec<u64> = (0..4096).map(|i| i * 31).collect();
        let indices = Lcg::index_sequence(12_345, 1024 + 16, data.len());
        let first = random_sum(&data, &indices, 1024);
        let second = random_sum(&data, &indices, 1024);
        assert_eq!(first, second);

        // Prefetching never changes the result, only the timing.
        assert_eq!(
            random_sum_prefetch(&data, &indices, 1024, 8, PrefetchHint::Nearest),
            first
        );
        assert_eq!(random_sum_multi_prefetch(&data, &indices, 1024), first);
    }

    #[test]
    fn stream_rw_checksum_is_independent_of_lookahead() {
        let mut a: Vec<u64> = (0..4096).collect();
        let mut b = a.clone();
        let plain = stream_rw(&mut a, None);
        let ahead = stream_rw(&mut b, Some((16, PrefetchHint::Nearest)));
        assert_eq!(plain, ahead);
        assert_eq!(a, b);
    }

    #[test]
    fn strided_rw_writes_back_running_sum() {
        let mut data = vec![1u64; 256];
        let sum = strided_rw(&mut data, 1, 64);
        assert!(sum > 0);
        // First touched element now holds the first partial sum.
        assert_eq!(data[0], 1);
        assert_ne!(data[64], 1);
    }

    #[test]
    fn matmul_variants_agree_with_naive() {
        let n = 48;
        let a = Matrix::filled(n, 1.0).unwrap();
        let b = Matrix::filled(n, 2.0).unwrap();

        let mut c_naive = Matrix::zeroed(n).unwrap();
        matmul_naive(&a, &b, &mut c_naive);
        let expected = c_naive.checksum();

        let mut c = Matrix::zeroed(n).unwrap();
        matmul_prefetch(&a, &b, &mut c);
        assert_eq!(c.checksum(), expected);

        c.zero();
        matmul_blocked(&a, &b, &mut c, 16);
        assert_eq!(c.checksum(), expected);

        c.zero();
        matmul_blocked_prefetch(&a, &b, &mut c, 16);
        assert_eq!(c.checksum(), expected);
    }

    #[test]
    fn instr_groups_are_deterministic_and_distinct() {
        let a1 = instr_stream(InstrGroup::A, 100_000);
        let a2 = instr_stream(InstrGroup::A, 100_000);
        let b = instr_stream(InstrGroup::B, 100_000);
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[test]
    fn instr_group_footprint_spans_one_hundred_variants() {
        assert_eq!(GROUP_VARIANTS, 100);
        // One full round-robin pass calls every variant exactly once.
        let a = instr_stream(InstrGroup::A, GROUP_VARIANTS);
        let b = instr_stream(InstrGroup::B, GROUP_VARIANTS);
        assert_ne!(a, b);
    }

    #[test]
    fn compute_bound_is_deterministic() {
        assert_eq!(compute_bound(10_000), compute_bound(10_000));
    }
}
