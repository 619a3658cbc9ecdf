//! Benchmarks for record DAO operations
//!
//! This benchmark suite measures the performance of:
//! - Single loads served from the cache vs. the store
//! - Bulk loads of mixed cached / uncached ids
//! - The aggregate "all records" read
//! - Snapshot-local lookups

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use record_cache::dao::{DaoConfig, KeyStrategy, RecordDao, RecordDto};
use record_cache::{CacheSystem, MemoryRecordStore, RecordKey};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

struct Fixture {
    system: CacheSystem,
    dao: RecordDao<RecordDto>,
    keys: Vec<RecordKey>,
}

/// In-process cache and store holding `count` records
fn setup(rt: &Runtime, count: usize) -> Fixture {
    let system = CacheSystem::in_memory();
    let dao: RecordDao<RecordDto> = RecordDao::new(
        Arc::new(MemoryRecordStore::new()),
        DaoConfig::new("Question", KeyStrategy::NumericId),
    );
    let keys = rt.block_on(async {
        let mut dtos: Vec<RecordDto> = (0..count)
            .map(|i| {
                RecordDto::from_value(
                    None,
                    json!({"description": format!("Question {i}"), "choices": ["a", "b", "c"]}),
                )
            })
            .collect();
        dao.save_all(&system.facade(), &mut dtos)
            .await
            .unwrap_or_else(|_| panic!("Failed to seed records"))
    });
    Fixture { system, dao, keys }
}

fn runtime() -> Runtime {
    Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"))
}

/// Benchmark single loads: cache hit vs. store read
fn bench_load(c: &mut Criterion) {
    let rt = runtime();
    let fixture = setup(&rt, 100);

    let mut group = c.benchmark_group("load");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("cache_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let cache = fixture.system.facade();
            let key = &fixture.keys[rand::random::<usize>() % fixture.keys.len()];
            let dto = fixture
                .dao
                .load(&cache, Some(black_box(key)))
                .await
                .unwrap_or_else(|_| panic!("Failed to load"));
            black_box(dto);
        });
    });

    group.bench_function("negative_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let cache = fixture.system.facade();
            let key = RecordKey::Id(1_000_000);
            let dto = fixture
                .dao
                .load(&cache, Some(black_box(&key)))
                .await
                .unwrap_or_else(|_| panic!("Failed to load"));
            black_box(dto);
        });
    });

    group.finish();
}

/// Benchmark bulk loads of different batch sizes
fn bench_bulk_load(c: &mut Criterion) {
    let rt = runtime();
    let fixture = setup(&rt, 500);

    let mut group = c.benchmark_group("bulk_load");
    group.measurement_time(Duration::from_secs(5));

    for size in &[10usize, 100, 500] {
        let ids: Vec<RecordKey> = fixture.keys.iter().take(*size).cloned().collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let cache = fixture.system.facade();
                let dtos = fixture
                    .dao
                    .bulk_load(&cache, black_box(&ids))
                    .await
                    .unwrap_or_else(|_| panic!("Failed to bulk load"));
                black_box(dtos);
            });
        });
    }

    group.finish();
}

/// Benchmark the aggregate read once it is cached
fn bench_get_all(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("get_all");
    group.measurement_time(Duration::from_secs(5));

    for count in &[10usize, 100, 1000] {
        let fixture = setup(&rt, *count);
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.to_async(&rt).iter(|| async {
                let cache = fixture.system.facade();
                let all = fixture
                    .dao
                    .get_all(&cache)
                    .await
                    .unwrap_or_else(|_| panic!("Failed to read aggregate"));
                black_box(all);
            });
        });
    }

    group.finish();
}

/// Benchmark repeated loads inside one snapshot
fn bench_snapshot_load(c: &mut Criterion) {
    let rt = runtime();
    let fixture = setup(&rt, 100);
    let cache = fixture.system.facade();
    cache
        .begin_snapshot(None)
        .unwrap_or_else(|_| panic!("Failed to begin snapshot"));

    let mut group = c.benchmark_group("snapshot");
    group.bench_function("local_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let key = &fixture.keys[rand::random::<usize>() % fixture.keys.len()];
            let dto = fixture
                .dao
                .load(&cache, Some(black_box(key)))
                .await
                .unwrap_or_else(|_| panic!("Failed to load"));
            black_box(dto);
        });
    });
    group.finish();

    cache.clear_snapshot();
}

criterion_group!(
    benches,
    bench_load,
    bench_bulk_load,
    bench_get_all,
    bench_snapshot_load
);
criterion_main!(benches);
