//! Cache-line-aligned memory arenas for the workloads.
//!
//! The experiments care about exactly where data starts relative to cache
//! lines, so `Vec`'s allocator-chosen alignment is not enough: every arena
//! base address is aligned to [`CACHE_LINE_SIZE`]. An arena lives for one
//! experiment run and is freed afterwards.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::layout::CACHE_LINE_SIZE;
use crate::prefetch;

/// Fixed-size, cache-line-aligned array of `T`.
pub struct Arena<T: Copy> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

// One worker owns an arena for the duration of a run.
unsafe impl<T: Copy + Send> Send for Arena<T> {}
unsafe impl<T: Copy + Sync> Sync for Arena<T> {}

impl<T: Copy> Arena<T> {
    /// Allocate `len` zeroed elements at a cache-line-aligned base address.
    pub fn zeroed(len: usize) -> Result<Self> {
        let bytes = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(Error::Resource { bytes: usize::MAX })?;
        let align = CACHE_LINE_SIZE.max(std::mem::align_of::<T>());
        let layout = Layout::from_size_align(bytes.max(align), align)
            .map_err(|_| Error::Resource { bytes })?;

        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut T).ok_or(Error::Resource { bytes })?;

        Ok(Arena { ptr, len, layout })
    }

    /// Allocate and initialize element `i` with `f(i)`.
    pub fn from_fn(len: usize, f: impl Fn(usize) -> T) -> Result<Self> {
        let mut arena = Self::zeroed(len)?;
        for (i, slot) in arena.as_mut_slice().iter_mut().enumerate() {
            *slot = f(i);
        }
        Ok(arena)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Evict the whole arena from cache and fence, establishing a cold-cache
    /// starting condition. Call immediately before starting the timer.
    pub fn flush_all(&self) {
        let base = self.ptr.as_ptr() as *const u8;
        let bytes = self.len * std::mem::size_of::<T>();
        let mut off = 0;
        while off < bytes {
            prefetch::flush(unsafe { base.add(off) });
            off += CACHE_LINE_SIZE;
        }
        prefetch::fence();
    }
}

impl<T: Copy> Drop for Arena<T> {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, self.layout) };
    }
}
