//! Cache-line layout primitives.
//!
//! The interesting experiments here are all about whether two values land on
//! the same cache line or not. `CachePadded` forces isolation; `CounterBank`
//! builds a bank of per-thread counters in either an intentionally interleaved
//! layout (values packed together, reproducing false sharing) or a padded one
//! (each value on its own line).

use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicU64;

/// Cache-line width of the target parts (AMD Zen / recent Intel: 64 bytes).
pub const CACHE_LINE_SIZE: usize = 64;

/// Pads and aligns a value to a full cache line so adjacent instances never
/// share a line.
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        CachePadded { value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// How a bank of counters is laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterLayout {
    /// Counters packed back to back; several share one cache line. This is
    /// the false-sharing reproduction case.
    Interleaved,
    /// One counter per cache line; concurrent increments never contend on a
    /// line.
    Padded,
}

/// Fixed-size bank of atomic counters with a configurable cache layout.
pub struct CounterBank {
    layout: CounterLayout,
    interleaved: Vec<AtomicU64>,
    padded: Vec<CachePadded<AtomicU64>>,
}

impl CounterBank {
    pub fn new(layout: CounterLayout, n: usize) -> Self {
        let (interleaved, padded) = match layout {
            CounterLayout::Interleaved => ((0..n).map(|_| AtomicU64::new(0)).collect(), Vec::new()),
            CounterLayout::Padded => (
                Vec::new(),
                (0..n).map(|_| CachePadded::new(AtomicU64::new(0))).collect(),
            ),
        };
        CounterBank {
            layout,
            interleaved,
            padded,
        }
    }

    pub fn layout(&self) -> CounterLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        match self.layout {
            CounterLayout::Interleaved => self.interleaved.len(),
            CounterLayout::Padded => self.padded.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> &AtomicU64 {
        match self.layout {
            CounterLayout::Interleaved => &self.interleaved[i],
            CounterLayout::Padded => &self.padded[i],
        }
    }

    /// Byte address of counter `i`, for layout property checks.
    pub fn addr_of(&self, i: usize) -> usize {
        self.get(i) as *const AtomicU64 as usize
    }

    /// Byte distance between consecutive counters.
    pub fn stride(&self) -> usize {
        match self.layout {
            CounterLayout::Interleaved => std::mem::size_of::<AtomicU64>(),
            CounterLayout::Padded => std::mem::size_of::<CachePadded<AtomicU64>>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn line_of(addr: usize) -> usize {
        addr / CACHE_LINE_SIZE
    }

    #[test]
    fn cache_padded_fills_a_full_line() {
        assert_eq!(std::mem::size_of::<CachePadded<AtomicU64>>(), CACHE_LINE_SIZE);
        assert_eq!(std::mem::align_of::<CachePadded<AtomicU64>>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn padded_counters_occupy_disjoint_lines() {
        let bank = CounterBank::new(CounterLayout::Padded, 4);
        assert!(bank.stride() >= CACHE_LINE_SIZE);
        for i in 0..bank.len() {
            for j in 0..bank.len() {
                if i != j {
                    assert_ne!(line_of(bank.addr_of(i)), line_of(bank.addr_of(j)));
                }
            }
        }
    }

    #[test]
    fn interleaved_counters_share_lines_within_a_group() {
        let bank = CounterBank::new(CounterLayout::Interleaved, 4);
        assert!(bank.stride() < CACHE_LINE_SIZE);
        // 4 x 8 bytes = 32 bytes: all four counters fit in one line-sized
        // group, so at least two of them must share a line regardless of the
        // base offset; with an aligned allocation all of them do.
        let group = CACHE_LINE_SIZE / bank.stride();
        for i in 0..bank.len() {
            for j in 0..bank.len() {
                if i != j && i / group == j / group {
                    let dist = bank.addr_of(i).abs_diff(bank.addr_of(j));
                    assert!(dist < CACHE_LINE_SIZE);
                }
            }
        }
    }

    #[test]
    fn counters_increment_independently() {
        for layout in [CounterLayout::Interleaved, CounterLayout::Padded] {
            let bank = CounterBank::new(layout, 4);
            for i in 0..4 {
                bank.get(i).fetch_add(i as u64 + 1, Ordering::Relaxed);
            }
            for i in 0..4 {
                assert_eq!(bank.get(i).load(Ordering::Relaxed), i as u64 + 1);
            }
        }
    }
}
