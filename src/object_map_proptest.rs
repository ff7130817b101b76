#![cfg(test)]

// Property tests for ObjectMap kept inside the crate so they can reach the
// table-level counters without widening the public API.

use crate::allocator::CountingAlloc;
use crate::object_map::ObjectMap;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::hash::{BuildHasher, Hasher};

// Pool-indexed operations to improve shrinking: indices shrink to earlier
// keys, and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Erase(usize),
    Find(usize),
    Iterate,
    Clear,
}

fn arb_scenario() -> impl Strategy<Value = (usize, Vec<Op>)> {
    (1usize..=40).prop_flat_map(|pool| {
        let idx = 0..pool;
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            3 => idx.clone().prop_map(Op::Erase),
            2 => idx.prop_map(Op::Find),
            1 => Just(Op::Iterate),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..200).prop_map(move |ops| (pool, ops))
    })
}

// Keys are spread so a small pool still lands on distinct home slots.
fn key_of(i: usize) -> u64 {
    (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

fn run<S: BuildHasher>(
    mut sut: ObjectMap<(u64, i32), CountingAlloc, S>,
    alloc: &CountingAlloc,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<u64, i32> = HashMap::new();
    let mut erased: BTreeSet<u64> = BTreeSet::new();

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let k = key_of(i);
                let before = sut.len();
                let (is_new, pos) = sut.insert(alloc, (k, v));
                let was_present = model.insert(k, v).is_some();
                prop_assert_eq!(is_new, !was_present, "insert-or-update outcome");
                prop_assert_eq!(sut.len(), before + usize::from(is_new));
                prop_assert_eq!(pos.entry(&sut), Some(&(k, v)));
                erased.remove(&k);
            }
            Op::Erase(i) => {
                let k = key_of(i);
                let removed = sut.erase(k);
                prop_assert_eq!(removed, model.remove(&k).is_some());
                if removed {
                    erased.insert(k);
                }
            }
            Op::Find(i) => {
                let k = key_of(i);
                prop_assert_eq!(sut.get(k).map(|e| e.1), model.get(&k).copied());
            }
            Op::Iterate => {
                let s_keys: Vec<u64> = sut.iter().map(|e| e.0).collect();
                let unique: BTreeSet<u64> = s_keys.iter().copied().collect();
                prop_assert_eq!(
                    s_keys.len(),
                    unique.len(),
                    "each entry visited once"
                );
                let m_keys: BTreeSet<u64> = model.keys().copied().collect();
                prop_assert_eq!(unique, m_keys);
            }
            Op::Clear => {
                sut.clear(alloc);
                model.clear();
                erased.clear();
                prop_assert_eq!(sut.iter().count(), 0);
            }
        }

        // Post-conditions after each op
        // 1) Size parity and load bound
        prop_assert_eq!(sut.len(), model.len());
        prop_assert!(sut.len() + sut.tombstones() <= sut.capacity() / 4 * 3);
        // 2) Every model key is live, never merely marked
        for (&k, &v) in &model {
            let pos = sut.find_marked(k);
            prop_assert!(
                pos.is_some(),
                "not found: {}\n{}",
                k,
                sut.debug_layout()
            );
            let pos = pos.unwrap();
            prop_assert!(
                !pos.is_marked(&sut),
                "marked: {}\n{}",
                k,
                sut.debug_layout()
            );
            prop_assert_eq!(pos.entry(&sut), Some(&(k, v)));
        }
        // 3) Erased keys are not found as live members
        for &k in &erased {
            prop_assert!(sut.find(k).is_none(), "erased key live: {}", k);
        }
        // 4) Exactly one table outstanding
        prop_assert_eq!(alloc.live_blocks(), 1);
    }

    sut.dealloc(alloc);
    prop_assert_eq!(alloc.live_blocks(), 0);
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - insert reports new vs. updated exactly as the model does, and `len`
//   moves by one only for new keys.
// - erase of an absent key is a no-op returning false.
// - erased keys are never found as live; live keys are never marked.
// - iteration yields each live entry exactly once.
// - the load bound holds after every op, and exactly one table is live.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((_pool, ops) in arb_scenario()) {
        let alloc = CountingAlloc::new();
        let sut: ObjectMap<(u64, i32), CountingAlloc> = ObjectMap::new_in(&alloc);
        run(sut, &alloc, ops)?;
    }
}

// Collision variant using a constant hasher to stress tombstone handling
// on a single shared probe sequence.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((_pool, ops) in arb_scenario()) {
        let alloc = CountingAlloc::new();
        let sut: ObjectMap<(u64, i32), CountingAlloc, ConstBuildHasher> =
            ObjectMap::with_capacity_and_hasher_in(0, ConstBuildHasher, &alloc);
        run(sut, &alloc, ops)?;
    }
}

// Property: growth is an identity on the live set. Filling past several
// thresholds with tombstones mixed in keeps every surviving key and value.
proptest! {
    #[test]
    fn prop_resize_transparency(n in 1usize..300, erase_every in 2usize..7) {
        let alloc = CountingAlloc::new();
        let mut sut: ObjectMap<(u64, i32), CountingAlloc> = ObjectMap::new_in(&alloc);
        let mut expected = Vec::new();
        for i in 0..n {
            let k = key_of(i);
            sut.insert(&alloc, (k, i as i32));
            if i % erase_every == 0 {
                prop_assert!(sut.erase(k));
            } else {
                expected.push((k, i as i32));
            }
        }
        prop_assert_eq!(sut.len(), expected.len());
        for &(k, v) in &expected {
            prop_assert_eq!(sut.get(k), Some(&(k, v)));
        }
        sut.dealloc(&alloc);
        prop_assert_eq!(alloc.live_blocks(), 0);
    }
}
