use cown_map::{Access, BehaviorBuilder, Cown, IdSource};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;

// Typical behaviors name a handful of cowns, some of them twice.
fn bench_small_behavior(c: &mut Criterion) {
    let ids = IdSource::new();
    let cowns: Vec<Cown<u64>> = (0..8).map(|i| Cown::with_ids(&ids, i)).collect();
    c.bench_function("behavior_build_8_named_twice", |b| {
        b.iter(|| {
            let mut bb = BehaviorBuilder::new();
            for c in cowns.iter().chain(cowns.iter().rev()) {
                bb.request(c.borrowed(), Access::Read);
            }
            black_box(bb.finish().len())
        })
    });
}

fn bench_large_behavior(c: &mut Criterion) {
    let ids = IdSource::new();
    let cowns: Vec<Cown<u64>> = (0..1_000).map(|i| Cown::with_ids(&ids, i)).collect();
    c.bench_function("behavior_build_1000", |b| {
        b.iter_batched(
            BehaviorBuilder::new,
            |mut bb| {
                for c in &cowns {
                    bb.request(c.borrowed(), Access::Write);
                }
                black_box(bb.finish().len())
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_small_behavior, bench_large_behavior
}
criterion_main!(benches);
