//! Entry contract for `ObjectMap`.

use core::fmt::Debug;
use core::hash::Hash;

/// A stored entry that projects to an identity key.
///
/// Keys are small copyable identities (a cown handle, an id); the map
/// hashes and compares them and keeps a copy in tombstones for probing and
/// diagnostics.
pub trait MapEntry {
    type Key: Copy + Eq + Hash + Debug;

    fn key(&self) -> Self::Key;
}

impl<K, V> MapEntry for (K, V)
where
    K: Copy + Eq + Hash + Debug,
{
    type Key = K;

    #[inline]
    fn key(&self) -> K {
        self.0
    }
}
