//! Behavior construction: deduplicate the cowns a behavior names before
//! they reach the acquisition protocol.
//!
//! A behavior may name the same cown more than once; acquiring it twice
//! would deadlock. `BehaviorBuilder` folds the requests into an
//! `ObjectMap` keyed by `CownRef`, then hands back one request per cown,
//! sorted by `CownId` so every behavior acquires in the same global order.

use crate::allocator::MapAlloc;
use crate::cown::{Cown, CownRef};
use crate::object_map::ObjectMap;
use allocator_api2::alloc::Global;
use core::fmt;
use core::mem::ManuallyDrop;

/// How a behavior uses a cown. `Write` subsumes `Read`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    /// Access needed to satisfy both requests.
    #[inline]
    pub fn merge(self, other: Access) -> Access {
        self.max(other)
    }
}

/// One deduplicated cown request.
pub struct Request<'c, T> {
    pub cown: CownRef<'c, T>,
    pub access: Access,
}

impl<T> Clone for Request<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Request<'_, T> {}

impl<T> fmt::Debug for Request<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("cown", &self.cown)
            .field("access", &self.access)
            .finish()
    }
}

/// Collects the cowns of one behavior under construction.
///
/// Holds the allocator for its map; the map itself is handed the
/// allocator on every call and freed when the builder finishes or drops.
pub struct BehaviorBuilder<'c, T, A: MapAlloc = Global> {
    requests: ManuallyDrop<ObjectMap<(CownRef<'c, T>, Access), A>>,
    named: usize,
    alloc: A,
}

impl<'c, T> BehaviorBuilder<'c, T> {
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<'c, T> Default for BehaviorBuilder<'c, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'c, T, A: MapAlloc> BehaviorBuilder<'c, T, A> {
    pub fn new_in(alloc: A) -> Self {
        let requests = ObjectMap::new_in(&alloc);
        Self {
            requests: ManuallyDrop::new(requests),
            named: 0,
            alloc,
        }
    }

    /// Name `cown` as needed by the behavior. Returns true the first time a
    /// cown is named; repeats only widen its access.
    pub fn request(&mut self, cown: CownRef<'c, T>, access: Access) -> bool {
        self.named += 1;
        let access = match self.requests.get(cown) {
            Some(&(_, prev)) => prev.merge(access),
            None => access,
        };
        let (is_new, _) = self.requests.insert(&self.alloc, (cown, access));
        is_new
    }

    /// Drop a pending request. Returns false if `cown` was not requested.
    pub fn withdraw(&mut self, cown: CownRef<'c, T>) -> bool {
        self.requests.erase(cown)
    }

    pub fn access(&self, cown: CownRef<'c, T>) -> Option<Access> {
        self.requests.get(cown).map(|&(_, access)| access)
    }

    /// Distinct cowns currently requested.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Forget every request and start over.
    pub fn reset(&mut self) {
        self.requests.clear(&self.alloc);
        self.named = 0;
    }

    /// Produce the acquisition order and free the map.
    pub fn finish(self) -> AcquisitionSet<'c, T> {
        let mut requests: Vec<Request<'c, T>> = self
            .requests
            .iter()
            .map(|&(cown, access)| Request { cown, access })
            .collect();
        requests.sort_unstable_by_key(|r| r.cown.id());
        tracing::debug!(
            named = self.named,
            distinct = requests.len(),
            "behavior cown set finished"
        );
        AcquisitionSet { requests }
    }
}

impl<T, A: MapAlloc> Drop for BehaviorBuilder<'_, T, A> {
    fn drop(&mut self) {
        // SAFETY: `requests` is taken exactly once, here.
        let requests = unsafe { ManuallyDrop::take(&mut self.requests) };
        requests.dealloc(&self.alloc);
    }
}

impl<T, A: MapAlloc> fmt::Debug for BehaviorBuilder<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorBuilder")
            .field("named", &self.named)
            .field("requests", &*self.requests)
            .finish()
    }
}

/// Deduplicated cown requests of one behavior in acquisition order.
pub struct AcquisitionSet<'c, T> {
    requests: Vec<Request<'c, T>>,
}

impl<'c, T> AcquisitionSet<'c, T> {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Request<'c, T>> {
        self.requests.iter()
    }

    /// Take an owning reference to every cown, in acquisition order.
    pub fn acquire_all(&self) -> Vec<(Cown<T>, Access)> {
        self.requests
            .iter()
            .map(|r| (r.cown.acquire(), r.access))
            .collect()
    }
}

impl<'a, 'c, T> IntoIterator for &'a AcquisitionSet<'c, T> {
    type Item = &'a Request<'c, T>;
    type IntoIter = core::slice::Iter<'a, Request<'c, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> fmt::Debug for AcquisitionSet<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.requests).finish()
    }
}
