use cown_map::{Global, ObjectMap};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

type Map = ObjectMap<(u64, u64), Global>;

fn bench_insert(c: &mut Criterion) {
    c.bench_function("object_map_insert_10k", |b| {
        b.iter_batched(
            || Map::new_in(&Global),
            |mut m| {
                for (i, x) in lcg(1).take(10_000).enumerate() {
                    m.insert(&Global, (x, i as u64));
                }
                black_box(m.len());
                m.dealloc(&Global);
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_find_hit(c: &mut Criterion) {
    c.bench_function("object_map_find_hit", |b| {
        let mut m = Map::new_in(&Global);
        let keys: Vec<u64> = lcg(7).take(20_000).collect();
        for (i, &k) in keys.iter().enumerate() {
            m.insert(&Global, (k, i as u64));
        }
        let mut it = keys.iter().cycle();
        b.iter(|| {
            let k = *it.next().unwrap();
            black_box(m.find(k));
        });
        m.dealloc(&Global);
    });
}

fn bench_find_miss(c: &mut Criterion) {
    c.bench_function("object_map_find_miss", |b| {
        let mut m = Map::new_in(&Global);
        for (i, x) in lcg(11).take(10_000).enumerate() {
            m.insert(&Global, (x, i as u64));
        }
        let mut miss = lcg(0xdead_beef);
        b.iter(|| {
            // keys unlikely to be in the map
            black_box(m.find(miss.next().unwrap()));
        });
        m.dealloc(&Global);
    });
}

// Erase/reinsert churn: tombstone reuse on the hot path.
fn bench_erase_reinsert(c: &mut Criterion) {
    c.bench_function("object_map_erase_reinsert", |b| {
        let mut m = Map::new_in(&Global);
        let keys: Vec<u64> = lcg(13).take(1_000).collect();
        for &k in &keys {
            m.insert(&Global, (k, 0));
        }
        let mut it = keys.iter().cycle();
        b.iter(|| {
            let k = *it.next().unwrap();
            m.erase(k);
            black_box(m.insert(&Global, (k, 1)));
        });
        m.dealloc(&Global);
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_insert, bench_find_hit, bench_find_miss, bench_erase_reinsert
}
criterion_main!(benches);
