//! Allocator capability threaded through every table allocation.
//!
//! `ObjectMap` never stores an allocator. Each call that allocates or
//! frees a table takes one by reference, so the caller decides which arena
//! backs the map at every step.

use allocator_api2::alloc::{AllocError, Allocator, Global};
use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;
use std::rc::Rc;

/// Allocators whose values are interchangeable for freeing.
///
/// # Safety
///
/// A block allocated through any value of the implementing type must be
/// valid to deallocate through any other value of that type. The map is
/// handed its allocator per call, so the value used to free a table may
/// differ from the one that allocated it.
pub unsafe trait MapAlloc: Allocator {}

// SAFETY: `Global` is a zero-sized handle to the process allocator.
unsafe impl MapAlloc for Global {}

// SAFETY: every `&A` resolves to some `A: MapAlloc`, which upholds the
// contract for all of its values.
unsafe impl<A: MapAlloc + ?Sized> MapAlloc for &A {}

#[derive(Debug, Default)]
struct AllocStats {
    live_blocks: Cell<usize>,
    live_bytes: Cell<usize>,
    allocations: Cell<usize>,
}

/// Instrumented allocator over [`Global`] that counts outstanding blocks.
///
/// Clones share counters. Used by tests and benches to check that every
/// table is freed exactly once.
#[derive(Clone, Debug, Default)]
pub struct CountingAlloc {
    stats: Rc<AllocStats>,
}

impl CountingAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks allocated and not yet freed.
    pub fn live_blocks(&self) -> usize {
        self.stats.live_blocks.get()
    }

    pub fn live_bytes(&self) -> usize {
        self.stats.live_bytes.get()
    }

    /// Total successful allocations since creation.
    pub fn allocations(&self) -> usize {
        self.stats.allocations.get()
    }
}

unsafe impl Allocator for CountingAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let block = Global.allocate(layout)?;
        let s = &self.stats;
        s.live_blocks.set(s.live_blocks.get() + 1);
        s.live_bytes.set(s.live_bytes.get() + layout.size());
        s.allocations.set(s.allocations.get() + 1);
        Ok(block)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let s = &self.stats;
        debug_assert!(
            s.live_blocks.get() > 0,
            "CountingAlloc: free without allocation"
        );
        s.live_blocks.set(s.live_blocks.get().wrapping_sub(1));
        s.live_bytes.set(s.live_bytes.get().wrapping_sub(layout.size()));
        unsafe { Global.deallocate(ptr, layout) }
    }
}

// SAFETY: every value forwards to `Global`; only the counters differ.
unsafe impl MapAlloc for CountingAlloc {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_track_allocate_and_deallocate() {
        let a = CountingAlloc::new();
        let layout = Layout::array::<u64>(4).unwrap();
        let block = a.allocate(layout).expect("allocation");
        assert_eq!(a.live_blocks(), 1);
        assert_eq!(a.live_bytes(), 32);

        // Clones share the same counters.
        let b = a.clone();
        unsafe { b.deallocate(block.cast(), layout) };
        assert_eq!(a.live_blocks(), 0);
        assert_eq!(a.live_bytes(), 0);
        assert_eq!(a.allocations(), 1);
    }
}
