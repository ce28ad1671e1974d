//! Software prefetch, cache-line flush and memory fence primitives.
//!
//! All operations here are advisory or timing-only: they never change program
//! results, only where data sits in the cache hierarchy. On architectures
//! without the relevant instructions they compile to no-ops so the workloads
//! stay portable.

/// Which cache level a prefetched line should land in.
///
/// Maps to the x86 T0/T1/T2/NTA hints: `Nearest` pulls into every level
/// including L1, `Mid` stops at L2, `Far` at L3, and `NonTemporal` marks the
/// line for quick eviction (streaming data that is read once).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchHint {
    Nearest,
    Mid,
    Far,
    NonTemporal,
}

/// Request that the line containing `ptr` be brought into cache at the hinted
/// level. Best-effort; prefetching an invalid address is a no-op, not a fault.
#[inline(always)]
pub fn prefetch<T>(ptr: *const T, hint: PrefetchHint) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use std::arch::x86_64::{
            _mm_prefetch, _MM_HINT_NTA, _MM_HINT_T0, _MM_HINT_T1, _MM_HINT_T2,
        };
        match hint {
            PrefetchHint::Nearest => _mm_prefetch(ptr as *const i8, _MM_HINT_T0),
            PrefetchHint::Mid => _mm_prefetch(ptr as *const i8, _MM_HINT_T1),
            PrefetchHint::Far => _mm_prefetch(ptr as *const i8, _MM_HINT_T2),
            PrefetchHint::NonTemporal => _mm_prefetch(ptr as *const i8, _MM_HINT_NTA),
        }
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        match hint {
            PrefetchHint::Nearest | PrefetchHint::Mid => {
                std::arch::asm!("prfm pldl1keep, [{0}]", in(reg) ptr);
            }
            PrefetchHint::Far => {
                std::arch::asm!("prfm pldl2keep, [{0}]", in(reg) ptr);
            }
            PrefetchHint::NonTemporal => {
                std::arch::asm!("prfm pldl1strm, [{0}]", in(reg) ptr);
            }
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let _ = (ptr, hint);
    }
}

/// Evict the cache line containing `ptr` from every cache level.
///
/// Used to force a cold-cache start before a timed run. Call [`fence`] after a
/// batch of flushes, before starting the timer.
#[inline(always)]
pub fn flush<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        std::arch::x86_64::_mm_clflush(ptr as *const u8);
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        std::arch::asm!("dc civac, {0}", in(reg) ptr);
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let _ = ptr;
    }
}

/// Full memory barrier, ordering preceding flushes before subsequent loads.
#[inline(always)]
pub fn fence() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        std::arch::x86_64::_mm_mfence();
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        std::arch::asm!("dmb sy");
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_then_prefetch_preserves_values() {
        let data: Vec<u64> = (0..1024).collect();
        let before = data[512];

        flush(&data[512]);
        fence();
        prefetch(&data[512], PrefetchHint::Nearest);

        assert_eq!(data[512], before);
    }

    #[test]
    fn all_hints_are_side_effect_free() {
        let value = 0xA5A5_A5A5u64;
        for hint in [
            PrefetchHint::Nearest,
            PrefetchHint::Mid,
            PrefetchHint::Far,
            PrefetchHint::NonTemporal,
        ] {
            prefetch(&value, hint);
        }
        assert_eq!(value, 0xA5A5_A5A5);
    }

    #[test]
    fn prefetch_past_the_end_does_not_fault() {
        let data: Vec<u64> = vec![0; 16];
        // Advisory prefetch of an address beyond the allocation is defined to
        // be harmless.
        prefetch(data.as_ptr().wrapping_add(64), PrefetchHint::Nearest);
    }
}
