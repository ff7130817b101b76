//! Raw slot storage for `ObjectMap`.
//!
//! A table is one allocator block holding `capacity` slots. It has no
//! `Drop`: the owning map frees it through the allocator it is handed.

use crate::allocator::MapAlloc;
use crate::entry::MapEntry;
use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use std::alloc::handle_alloc_error;

pub(crate) enum Slot<E: MapEntry> {
    Empty,
    Occupied(E),
    /// Erased entry; the key is kept so probe sequences stay intact.
    Tombstone(E::Key),
}

pub(crate) struct RawTable<E: MapEntry> {
    ptr: NonNull<Slot<E>>,
    capacity: usize,
    _owns: PhantomData<Slot<E>>,
}

impl<E: MapEntry> RawTable<E> {
    pub(crate) const fn unallocated() -> Self {
        Self {
            ptr: NonNull::dangling(),
            capacity: 0,
            _owns: PhantomData,
        }
    }

    /// Allocate `capacity` empty slots. Exhaustion is fatal.
    pub(crate) fn allocate_in<A: MapAlloc>(capacity: usize, alloc: &A) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let layout = Self::layout(capacity);
        let ptr: NonNull<Slot<E>> = match alloc.allocate(layout) {
            Ok(block) => block.cast(),
            Err(_) => handle_alloc_error(layout),
        };
        for i in 0..capacity {
            // SAFETY: `i < capacity` and the block holds `capacity` slots.
            unsafe { ptr.as_ptr().add(i).write(Slot::Empty) };
        }
        Self {
            ptr,
            capacity,
            _owns: PhantomData,
        }
    }

    fn layout(capacity: usize) -> Layout {
        Layout::array::<Slot<E>>(capacity).expect("capacity overflow")
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn is_allocated(&self) -> bool {
        self.capacity != 0
    }

    #[inline]
    pub(crate) fn slots(&self) -> &[Slot<E>] {
        // SAFETY: either `capacity` initialized slots, or zero slots over a
        // dangling, aligned pointer.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }

    #[inline]
    pub(crate) fn slots_mut(&mut self) -> &mut [Slot<E>] {
        // SAFETY: as in `slots`, with exclusive access through `&mut self`.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }

    /// Drop every entry in place, leaving all slots empty. The block stays
    /// allocated.
    pub(crate) fn drop_entries(&mut self) {
        for slot in self.slots_mut() {
            *slot = Slot::Empty;
        }
    }

    /// Drop remaining entries and return the block to `alloc`.
    ///
    /// `alloc` must be able to free blocks from the allocator that created
    /// this table, which `MapAlloc` guarantees for values of the same type.
    pub(crate) fn free_in<A: MapAlloc>(&mut self, alloc: &A) {
        if !self.is_allocated() {
            return;
        }
        let layout = Self::layout(self.capacity);
        let slots: *mut [Slot<E>] = self.slots_mut();
        // Unlink first so a panicking entry destructor cannot lead to a
        // second free.
        let block = self.ptr.cast::<u8>();
        *self = Self::unallocated();
        // SAFETY: the slots are initialized and no longer reachable through
        // `self`; the block came from `A::allocate` with `layout`.
        unsafe {
            ptr::drop_in_place(slots);
            alloc.deallocate(block, layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::CountingAlloc;

    #[test]
    fn allocate_initializes_empty_slots_and_free_returns_block() {
        let alloc = CountingAlloc::new();
        let mut t: RawTable<(u64, String)> = RawTable::allocate_in(8, &alloc);
        assert_eq!(t.capacity(), 8);
        assert!(t.slots().iter().all(|s| matches!(s, Slot::Empty)));
        assert_eq!(alloc.live_blocks(), 1);

        t.slots_mut()[3] = Slot::Occupied((7, "seven".to_string()));
        t.free_in(&alloc);
        assert!(!t.is_allocated());
        assert_eq!(t.slots().len(), 0);
        assert_eq!(alloc.live_blocks(), 0);

        // Freeing an unallocated table is a no-op.
        t.free_in(&alloc);
        assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn drop_entries_keeps_block() {
        let alloc = CountingAlloc::new();
        let mut t: RawTable<(u64, String)> = RawTable::allocate_in(4, &alloc);
        t.slots_mut()[0] = Slot::Occupied((1, "x".to_string()));
        t.slots_mut()[1] = Slot::Tombstone(2);
        t.drop_entries();
        assert!(t.slots().iter().all(|s| matches!(s, Slot::Empty)));
        assert_eq!(alloc.live_blocks(), 1);
        t.free_in(&alloc);
        assert_eq!(alloc.live_blocks(), 0);
    }
}
