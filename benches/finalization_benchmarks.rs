//! Benchmarks for guard attachment, firing and the shutdown sweep

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use finalguard::test_utils::{CountedResource, FireCounter, isolated_binder};
use finalguard::{CollectorMode, Finalize, Guard, ObjectId, Registry};
use std::hint::black_box;

fn guard_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("guard");
    let counter = FireCounter::new();

    group.bench_function("fire_pending", |b| {
        b.iter_batched(
            || Guard::new(ObjectId::next(), "bench", counter.action()),
            |guard| black_box(guard.fire().unwrap()),
            BatchSize::SmallInput,
        );
    });

    // Fast path: the guard is already consumed
    let consumed = Guard::new(ObjectId::next(), "bench", counter.action());
    consumed.fire().unwrap();
    group.bench_function("fire_consumed", |b| {
        b.iter(|| black_box(consumed.fire().unwrap()));
    });

    group.finish();
}

fn binder_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("binder");

    for mode in [CollectorMode::Inline, CollectorMode::Deferred] {
        let binder = isolated_binder(mode);
        let counter = FireCounter::new();

        group.bench_function(BenchmarkId::new("alloc_and_drop", format!("{mode:?}")), |b| {
            b.iter(|| {
                let obj = binder
                    .alloc(CountedResource::new("bench", &counter))
                    .unwrap();
                black_box(obj.id());
            });
            binder.heap().collect();
        });

        group.bench_function(BenchmarkId::new("alloc_finalize", format!("{mode:?}")), |b| {
            b.iter(|| {
                let obj = binder
                    .alloc(CountedResource::new("bench", &counter))
                    .unwrap();
                black_box(obj.finalize().unwrap());
            });
            binder.heap().collect();
        });
    }

    group.finish();
}

fn sweep_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    for size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let counter = FireCounter::new();
            b.iter_batched(
                || {
                    let registry = Registry::new();
                    for _ in 0..size {
                        let id = ObjectId::next();
                        let guard = registry.new_guard(id, "bench", counter.action());
                        registry.register(id, guard).unwrap();
                    }
                    registry
                },
                |registry| black_box(registry.sweep_all()),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    guard_benchmarks,
    binder_benchmarks,
    sweep_benchmarks
);
criterion_main!(benches);
