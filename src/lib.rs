//! cown-map: an identity-keyed, open-addressing map used to deduplicate
//! the cowns a behavior requests before they are acquired.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: requesting the same cown twice in one behavior would deadlock
//!   the multi-cown acquisition protocol. Behavior construction funnels
//!   every requested cown through an `ObjectMap` so each appears once.
//! - Layers:
//!   - RawTable<E>: one allocator block of `Empty`/`Occupied`/`Tombstone`
//!     slots. No `Drop`; freed through an explicitly passed allocator.
//!   - ObjectMap<E, A, S>: insert-or-update, find, tombstoning erase,
//!     clear, growth, iteration and a slot-level diagnostic dump.
//!   - BehaviorBuilder: the consumer. One map per behavior, read back in
//!     `CownId` order, then discarded.
//!
//! Constraints
//! - Single owner: `ObjectMap` is `!Send`/`!Sync` (raw table pointer) and
//!   takes `&mut self` for every mutation, so iteration cannot overlap a
//!   mutation.
//! - No hidden allocation: the allocator is an argument of every call that
//!   allocates or frees (`new_in`, `insert`, `clear`, `dealloc`) and is
//!   never stored by the map. `MapAlloc` makes that sound.
//! - Non-owning keys: maps store `CownRef`, a borrowed handle. Inserting
//!   does not acquire, erasing and clearing do not release. The borrow
//!   checker keeps a cown alive while any map holds it.
//!
//! Table invariants
//! - Capacity is a power of two, at least `INITIAL_CAPACITY`.
//! - Keys are unique among occupied slots; `len()` counts them.
//! - `len + tombstones <= 3/4 * capacity`. An insert that would fill an
//!   empty slot past the bound grows first.
//! - Probing is triangular from `hash & mask`; the default hasher
//!   (`FxBuildHasher`) is deterministic, and cowns hash by `CownId`, so a
//!   replayed run reproduces the same layout.
//!
//! Tombstones
//! - Erase turns a slot into a tombstone holding the old key.
//! - An insert of a new key reuses the first tombstone on its probe path,
//!   which for a just-erased key is usually its own old slot.
//! - Growth rehashes live entries only, reclaiming every tombstone.
//!
//! Notes and non-goals
//! - Not a concurrent map and not a general-purpose one: no removal that
//!   returns the entry, no mutable iteration, no shrinking.
//! - Dropping a map without `dealloc` drops its entries, leaks the table
//!   and logs a warning.

pub mod allocator;
pub mod behavior;
pub mod cown;
pub mod entry;
pub mod object_map;
mod object_map_proptest;
mod table;

// Public surface
pub use allocator::{CountingAlloc, MapAlloc};
pub use allocator_api2::alloc::Global;
pub use behavior::{Access, AcquisitionSet, BehaviorBuilder, Request};
pub use cown::{Cown, CownId, CownRef, IdSource};
pub use entry::MapEntry;
pub use object_map::{DebugLayout, Iter, ObjectMap, Position, INITIAL_CAPACITY};
