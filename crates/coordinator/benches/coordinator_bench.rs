//! Coordinator hot-path benchmarks

use coordinator::{Coordinator, GenerationStore};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mapwatch_core::{
    ChangeRecord, Clock, GenerationReport, RenderAdapter, RenderError, SourceKey, SystemClock,
    Timestamp,
};
use std::path::Path;
use std::sync::Arc;

struct NoopAdapter;

impl RenderAdapter for NoopAdapter {
    fn generate(&self, _key: &SourceKey) -> Result<GenerationReport, RenderError> {
        Ok(GenerationReport::default())
    }
}

fn keys(n: usize) -> Vec<SourceKey> {
    (0..n)
        .map(|i| SourceKey::from_path(&Path::new("/maps").join(format!("map{i}.tmx"))))
        .collect()
}

fn bench_store(c: &mut Criterion) {
    let store = GenerationStore::new();
    let keys = keys(1_000);

    c.bench_function("store_enter_leave", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            if store.try_enter_busy(black_box(key)) {
                store.leave_busy(key);
            }
        });
    });

    c.bench_function("store_stamp_stale", |b| {
        let key = &keys[0];
        store.stamp_if_fresh(key, Timestamp::from_nanos(1), Timestamp::from_nanos(u64::MAX / 2));
        b.iter(|| store.stamp_if_fresh(black_box(key), Timestamp::from_nanos(2), Timestamp::from_nanos(3)));
    });
}

fn bench_process(c: &mut Criterion) {
    let coordinator = Coordinator::new(NoopAdapter, Arc::new(SystemClock) as Arc<dyn Clock>);
    let keys = keys(100);

    c.bench_function("process_fresh", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = keys[i % keys.len()].clone();
            i += 1;
            black_box(coordinator.process(ChangeRecord::new(key, SystemClock.now())))
        });
    });

    c.bench_function("process_stale", |b| {
        let key = keys[0].clone();
        b.iter(|| {
            black_box(coordinator.process(ChangeRecord::new(key.clone(), Timestamp::from_nanos(1))))
        });
    });
}

criterion_group!(benches, bench_store, bench_process);
criterion_main!(benches);
