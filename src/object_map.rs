//! ObjectMap: open-addressing map keyed by entry identity.
//!
//! Slots are `Empty`, `Occupied` or `Tombstone`. Erase leaves a tombstone
//! so later probes keep walking; tombstones are reclaimed when an insert
//! lands on one, and all at once when the table grows.

use crate::allocator::MapAlloc;
use crate::entry::MapEntry;
use crate::table::{RawTable, Slot};
use allocator_api2::alloc::Global;
use core::fmt;
use core::hash::BuildHasher;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use rustc_hash::FxBuildHasher;

/// Slots in a table built by `new_in`; also the smallest table ever built.
pub const INITIAL_CAPACITY: usize = 8;

/// Numerator of the maximum load factor over live plus tombstoned slots.
const LOAD_N: usize = 3;
/// Denominator of the maximum load factor.
const LOAD_D: usize = 4;

/// Index of a slot in the current table.
///
/// A position stays meaningful until the next insert that grows the table
/// or the next `clear`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Position(usize);

impl Position {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    /// The live entry at this position, if any.
    pub fn entry<'a, E, A, S>(self, map: &'a ObjectMap<E, A, S>) -> Option<&'a E>
    where
        E: MapEntry,
    {
        match map.table.slots().get(self.0)? {
            Slot::Occupied(e) => Some(e),
            _ => None,
        }
    }

    /// Key held at this position, whether live or tombstoned.
    pub fn key<E, A, S>(self, map: &ObjectMap<E, A, S>) -> Option<E::Key>
    where
        E: MapEntry,
    {
        match map.table.slots().get(self.0)? {
            Slot::Occupied(e) => Some(e.key()),
            Slot::Tombstone(k) => Some(*k),
            Slot::Empty => None,
        }
    }

    /// True if the slot holds an erased (tombstoned) entry.
    pub fn is_marked<E, A, S>(self, map: &ObjectMap<E, A, S>) -> bool
    where
        E: MapEntry,
    {
        matches!(map.table.slots().get(self.0), Some(Slot::Tombstone(_)))
    }
}

enum Probe {
    Found(usize),
    /// First reusable slot on the probe sequence: a tombstone if one was
    /// passed, otherwise the terminating empty slot.
    Vacant(usize),
}

/// Open-addressing map over `MapEntry` values.
///
/// The map owns its table but never the resources its keys refer to. The
/// allocator is supplied to every call that allocates or frees, and the
/// table must be released with [`ObjectMap::dealloc`].
pub struct ObjectMap<E: MapEntry, A = Global, S = FxBuildHasher> {
    table: RawTable<E>,
    len: usize,
    tombstones: usize,
    initial_capacity: usize,
    hasher: S,
    _alloc: PhantomData<fn(&A)>,
}

impl<E, A> ObjectMap<E, A>
where
    E: MapEntry,
    A: MapAlloc,
{
    pub fn new_in(alloc: &A) -> Self {
        Self::with_slots_in(INITIAL_CAPACITY, FxBuildHasher, alloc)
    }

    /// Build a map whose first table fits `capacity` entries without growing.
    pub fn with_capacity_in(capacity: usize, alloc: &A) -> Self {
        Self::with_capacity_and_hasher_in(capacity, FxBuildHasher, alloc)
    }
}

impl<E, A, S> ObjectMap<E, A, S>
where
    E: MapEntry,
    A: MapAlloc,
    S: BuildHasher,
{
    pub fn with_capacity_and_hasher_in(capacity: usize, hasher: S, alloc: &A) -> Self {
        Self::with_slots_in(Self::slots_for(capacity), hasher, alloc)
    }

    fn with_slots_in(initial_capacity: usize, hasher: S, alloc: &A) -> Self {
        Self {
            table: RawTable::allocate_in(initial_capacity, alloc),
            len: 0,
            tombstones: 0,
            initial_capacity,
            hasher,
            _alloc: PhantomData,
        }
    }

    /// Smallest power-of-two slot count holding `entries` under the load bound.
    fn slots_for(entries: usize) -> usize {
        let needed = entries
            .checked_mul(LOAD_D)
            .map(|n| n.div_ceil(LOAD_N))
            .and_then(usize::checked_next_power_of_two)
            .expect("capacity overflow");
        needed.max(INITIAL_CAPACITY)
    }

    #[inline]
    fn max_load(&self) -> usize {
        self.table.capacity() / LOAD_D * LOAD_N
    }

    #[inline]
    fn make_hash(&self, key: E::Key) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Number of live entries.
    #[doc(alias = "size")]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots in the current table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Erased slots awaiting reclamation.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    // Triangular probing: offsets 0, 1, 3, 6, ... visit every slot of a
    // power-of-two table exactly once.
    fn probe(&self, hash: u64, key: E::Key) -> Probe {
        let slots = self.table.slots();
        let mask = slots.len() - 1;
        let mut index = hash as usize & mask;
        let mut reusable = None;
        for stride in 1..=slots.len() {
            match &slots[index] {
                Slot::Empty => return Probe::Vacant(reusable.unwrap_or(index)),
                Slot::Occupied(e) if e.key() == key => return Probe::Found(index),
                Slot::Occupied(_) => {}
                Slot::Tombstone(_) => {
                    reusable.get_or_insert(index);
                }
            }
            index = (index + stride) & mask;
        }
        // The load bound keeps at least one slot empty, so a full walk can
        // only end here if every non-live slot is a tombstone.
        match reusable {
            Some(index) => Probe::Vacant(index),
            None => unreachable!("object map table has no free slot"),
        }
    }

    /// First empty slot on the probe sequence, ignoring keys.
    fn probe_empty(&self, hash: u64) -> usize {
        let slots = self.table.slots();
        let mask = slots.len() - 1;
        let mut index = hash as usize & mask;
        for stride in 1..=slots.len() {
            if let Slot::Empty = slots[index] {
                return index;
            }
            index = (index + stride) & mask;
        }
        unreachable!("object map table has no empty slot")
    }

    /// Insert `entry`, or overwrite the entry already stored under its key.
    ///
    /// Returns `(true, pos)` when the key was new and `(false, pos)` when an
    /// existing entry was overwritten. Only a new key can grow the table.
    pub fn insert(&mut self, alloc: &A, entry: E) -> (bool, Position) {
        let key = entry.key();
        let hash = self.make_hash(key);
        let index = match self.probe(hash, key) {
            Probe::Found(index) => {
                self.table.slots_mut()[index] = Slot::Occupied(entry);
                return (false, Position(index));
            }
            Probe::Vacant(index) => index,
        };

        let index = if let Slot::Tombstone(_) = self.table.slots()[index] {
            self.tombstones -= 1;
            index
        } else if self.len + self.tombstones + 1 > self.max_load() {
            self.grow(alloc);
            self.probe_empty(hash)
        } else {
            index
        };

        self.table.slots_mut()[index] = Slot::Occupied(entry);
        self.len += 1;
        self.debug_check();
        (true, Position(index))
    }

    /// Replace the table with one of double capacity holding only the live
    /// entries.
    ///
    /// Capacity doubles even when most of the load is tombstones, so a
    /// long-lived map churned with ever-new keys keeps growing. Maps are
    /// meant to live for one behavior; `clear` returns to the initial size.
    #[cold]
    fn grow(&mut self, alloc: &A) {
        let old_capacity = self.table.capacity();
        let new_capacity = old_capacity.checked_mul(2).expect("capacity overflow");
        let mut old = core::mem::replace(
            &mut self.table,
            RawTable::allocate_in(new_capacity, alloc),
        );
        for slot in old.slots_mut() {
            if let Slot::Occupied(entry) = core::mem::replace(slot, Slot::Empty) {
                let index = self.probe_empty(self.make_hash(entry.key()));
                self.table.slots_mut()[index] = Slot::Occupied(entry);
            }
        }
        old.free_in(alloc);
        tracing::trace!(
            old_capacity,
            new_capacity,
            len = self.len,
            reclaimed = self.tombstones,
            "object map grew"
        );
        self.tombstones = 0;
    }

    /// Position of the live entry stored under `key`.
    pub fn find(&self, key: E::Key) -> Option<Position> {
        match self.probe(self.make_hash(key), key) {
            Probe::Found(index) => Some(Position(index)),
            Probe::Vacant(_) => None,
        }
    }

    /// Diagnostic lookup that also reports a tombstone left by `key`.
    ///
    /// A live entry wins over any tombstone; check the result with
    /// [`Position::is_marked`].
    pub fn find_marked(&self, key: E::Key) -> Option<Position> {
        let slots = self.table.slots();
        let mask = slots.len() - 1;
        let mut index = self.make_hash(key) as usize & mask;
        let mut marked = None;
        for stride in 1..=slots.len() {
            match &slots[index] {
                Slot::Empty => break,
                Slot::Occupied(e) if e.key() == key => return Some(Position(index)),
                Slot::Tombstone(k) if *k == key => {
                    marked.get_or_insert(Position(index));
                }
                _ => {}
            }
            index = (index + stride) & mask;
        }
        marked
    }

    pub fn get(&self, key: E::Key) -> Option<&E> {
        self.find(key).and_then(|p| p.entry(self))
    }

    pub fn contains(&self, key: E::Key) -> bool {
        self.find(key).is_some()
    }

    /// Tombstone the entry stored under `key`. Returns false if absent.
    ///
    /// The erased entry is dropped here; nothing its key refers to is
    /// released. The tombstone keeps a copy of the key until the table grows,
    /// is cleared, or is deallocated, so a borrowed key stays borrowed for
    /// the map's whole lifetime.
    pub fn erase(&mut self, key: E::Key) -> bool {
        let Probe::Found(index) = self.probe(self.make_hash(key), key) else {
            return false;
        };
        self.table.slots_mut()[index] = Slot::Tombstone(key);
        self.len -= 1;
        self.tombstones += 1;
        self.debug_check();
        true
    }

    /// Free the table and start over with a fresh one of the initial
    /// capacity. Entries are dropped; keys' resources are not released.
    pub fn clear(&mut self, alloc: &A) {
        let dropped = self.len;
        self.table.free_in(alloc);
        self.table = RawTable::allocate_in(self.initial_capacity, alloc);
        self.len = 0;
        self.tombstones = 0;
        tracing::trace!(
            dropped,
            capacity = self.initial_capacity,
            "object map cleared"
        );
    }

    /// Release the table to `alloc`, consuming the map.
    pub fn dealloc(mut self, alloc: &A) {
        self.table.free_in(alloc);
        self.len = 0;
        self.tombstones = 0;
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> Iter<'_, E> {
        Iter {
            slots: self.table.slots().iter(),
            remaining: self.len,
        }
    }

    /// Slot-by-slot rendering for failure diagnosis.
    pub fn debug_layout(&self) -> DebugLayout<'_, E> {
        DebugLayout {
            slots: self.table.slots(),
            len: self.len,
            tombstones: self.tombstones,
        }
    }

    #[inline]
    fn debug_check(&self) {
        debug_assert!(
            self.len + self.tombstones <= self.max_load(),
            "load bound exceeded: {} live + {} tombstones in {} slots",
            self.len,
            self.tombstones,
            self.table.capacity()
        );
    }
}

impl<E: MapEntry, A, S> Drop for ObjectMap<E, A, S> {
    fn drop(&mut self) {
        if self.table.is_allocated() {
            // No allocator to give the block back to: drop payloads, leak
            // the block.
            self.table.drop_entries();
            tracing::warn!(
                capacity = self.table.capacity(),
                "object map dropped without dealloc; table leaked"
            );
        }
    }
}

impl<E, A, S> fmt::Debug for ObjectMap<E, A, S>
where
    E: MapEntry + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = self.table.slots().iter().filter_map(|s| match s {
            Slot::Occupied(e) => Some(e),
            _ => None,
        });
        f.debug_set().entries(live).finish()
    }
}

/// Iterator over live entries of an `ObjectMap`.
pub struct Iter<'a, E: MapEntry> {
    slots: core::slice::Iter<'a, Slot<E>>,
    remaining: usize,
}

impl<'a, E: MapEntry> Iterator for Iter<'a, E> {
    type Item = &'a E;

    fn next(&mut self) -> Option<&'a E> {
        if self.remaining == 0 {
            return None;
        }
        for slot in self.slots.by_ref() {
            if let Slot::Occupied(e) = slot {
                self.remaining -= 1;
                return Some(e);
            }
        }
        None
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<E: MapEntry> ExactSizeIterator for Iter<'_, E> {}

impl<E: MapEntry> FusedIterator for Iter<'_, E> {}

impl<E: MapEntry> Clone for Iter<'_, E> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            remaining: self.remaining,
        }
    }
}

impl<'a, E, A, S> IntoIterator for &'a ObjectMap<E, A, S>
where
    E: MapEntry,
    A: MapAlloc,
    S: BuildHasher,
{
    type Item = &'a E;
    type IntoIter = Iter<'a, E>;

    fn into_iter(self) -> Iter<'a, E> {
        self.iter()
    }
}

/// `Display` adapter returned by [`ObjectMap::debug_layout`].
pub struct DebugLayout<'a, E: MapEntry> {
    slots: &'a [Slot<E>],
    len: usize,
    tombstones: usize,
}

impl<E: MapEntry> fmt::Display for DebugLayout<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ObjectMap capacity={} len={} tombstones={}",
            self.slots.len(),
            self.len,
            self.tombstones
        )?;
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Slot::Empty => write!(f, "\n  [{i}] empty")?,
                Slot::Occupied(e) => write!(f, "\n  [{i}] {:?}", e.key())?,
                Slot::Tombstone(k) => write!(f, "\n  [{i}] tombstone {k:?}")?,
            }
        }
        Ok(())
    }
}
