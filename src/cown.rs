//! Cown handles.
//!
//! A cown is a reference-counted shared resource. Two handle types keep the
//! ownership story visible at call sites:
//! - `Cown<T>` owns one strong reference; cloning acquires, dropping or
//!   `release` gives it back.
//! - `CownRef<'a, T>` borrows an owning handle. It is what maps store: it
//!   cannot release anything, and the borrow checker keeps the cown alive
//!   for as long as any map holds it. Erasing a key does not end that
//!   borrow (the tombstone still names the cown), so an erased cown can only
//!   be released once the map itself is gone.
//!
//! Both hash and compare by `CownId`, a stable id assigned at creation,
//! never by address. Replaying a run with a fresh `IdSource` reproduces the
//! same ids and therefore the same table layouts.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::atomic::{self, AtomicU64};
use std::sync::Arc;

/// Stable identity of a cown.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CownId(u64);

impl CownId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cown#{}", self.0)
    }
}

/// Monotonic source of `CownId`s, starting at 1.
#[derive(Debug)]
pub struct IdSource {
    next: AtomicU64,
}

impl IdSource {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> CownId {
        CownId(self.next.fetch_add(1, atomic::Ordering::Relaxed))
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_IDS: IdSource = IdSource::new();

struct CownBox<T> {
    id: CownId,
    value: T,
}

/// Owning handle to a cown.
pub struct Cown<T> {
    inner: Arc<CownBox<T>>,
}

impl<T> Cown<T> {
    /// Create a cown with an id from the process-wide source.
    pub fn new(value: T) -> Self {
        Self::with_ids(&GLOBAL_IDS, value)
    }

    /// Create a cown with an id drawn from `ids`.
    pub fn with_ids(ids: &IdSource, value: T) -> Self {
        Self {
            inner: Arc::new(CownBox {
                id: ids.next_id(),
                value,
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> CownId {
        self.inner.id
    }

    /// Borrow a non-owning handle suitable for use as a map key.
    #[inline]
    pub fn borrowed(&self) -> CownRef<'_, T> {
        CownRef { inner: &self.inner }
    }

    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    /// Give back this reference. Returns true if it was the last one and
    /// the cown has been destroyed.
    pub fn release(self) -> bool {
        Arc::into_inner(self.inner).is_some()
    }

    /// Recover the value if this is the only reference.
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        match Arc::try_unwrap(this.inner) {
            Ok(b) => Ok(b.value),
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl<T> Clone for Cown<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Cown<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cown").field(&self.id()).finish()
    }
}

impl<T> PartialEq for Cown<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T> Eq for Cown<T> {}

impl<T> Hash for Cown<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// Borrowed, non-owning handle to a cown.
pub struct CownRef<'a, T> {
    inner: &'a Arc<CownBox<T>>,
}

impl<'a, T> CownRef<'a, T> {
    #[inline]
    pub fn id(self) -> CownId {
        self.inner.id
    }

    /// Take a new strong reference.
    pub fn acquire(self) -> Cown<T> {
        Cown {
            inner: Arc::clone(self.inner),
        }
    }
}

impl<T> Clone for CownRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CownRef<'_, T> {}

impl<T> PartialEq for CownRef<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T> Eq for CownRef<'_, T> {}

impl<T> PartialOrd for CownRef<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for CownRef<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl<T> Hash for CownRef<'_, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl<T> fmt::Debug for CownRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_per_source() {
        let ids = IdSource::new();
        let a = Cown::with_ids(&ids, ());
        let b = Cown::with_ids(&ids, ());
        assert_eq!(a.id().get(), 1);
        assert_eq!(b.id().get(), 2);
        assert_eq!(a.id().to_string(), "cown#1");

        // A fresh source replays the same ids.
        let replay = IdSource::new();
        assert_eq!(Cown::with_ids(&replay, ()).id(), a.id());
    }

    #[test]
    fn borrowed_handles_do_not_touch_the_count() {
        let c = Cown::new(5u32);
        let r1 = c.borrowed();
        let r2 = r1;
        assert_eq!(Cown::strong_count(&c), 1);
        assert_eq!(r1, r2);
        assert_eq!(r1.id(), c.id());

        let acquired = r1.acquire();
        assert_eq!(Cown::strong_count(&c), 2);
        assert!(!acquired.release());
        assert_eq!(Cown::strong_count(&c), 1);
    }

    #[test]
    fn release_reports_last_reference() {
        let c = Cown::new(String::from("v"));
        let c2 = c.clone();
        assert!(!c.release());
        assert_eq!(Cown::try_unwrap(c2).ok().as_deref(), Some("v"));

        let d = Cown::new(1u8);
        let d2 = d.clone();
        let d = Cown::try_unwrap(d).unwrap_err();
        assert!(!d2.release());
        assert!(d.release());
    }

    #[test]
    fn hash_and_order_follow_id() {
        use std::collections::hash_map::DefaultHasher;
        let ids = IdSource::new();
        let a = Cown::with_ids(&ids, 0u8);
        let b = Cown::with_ids(&ids, 0u8);
        assert!(a.borrowed() < b.borrowed());

        let h = |r: CownRef<'_, u8>| {
            let mut s = DefaultHasher::new();
            r.hash(&mut s);
            s.finish()
        };
        let mut s = DefaultHasher::new();
        a.id().hash(&mut s);
        assert_eq!(h(a.borrowed()), s.finish());
        assert_eq!(format!("{:?}", b.borrowed()), "cown#2");
    }
}
