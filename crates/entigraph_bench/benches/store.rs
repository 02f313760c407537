//! Store operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entigraph_bench::{fixture_store, populated, random_accounts};
use entigraph_testkit::{account, order};
use rand::Rng;

/// Benchmark saving one new account.
fn bench_single_save(c: &mut Criterion) {
    c.bench_function("single_save", |b| {
        let store = fixture_store();
        b.iter(|| {
            let saved = store.save(black_box(&account(42))).unwrap();
            black_box(saved);
        });
    });
}

/// Benchmark batch saves.
fn bench_batch_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_save");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &size| {
                let store = fixture_store();
                let batch = random_accounts(size);
                b.iter(|| {
                    let saved = store.save_all(black_box(&batch)).unwrap();
                    black_box(saved);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark reading then updating an account.
fn bench_update(c: &mut Criterion) {
    c.bench_function("update", |b| {
        let (store, ids) = populated(100);
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let id = ids[rng.gen_range(0..ids.len())].clone();
            let mut copy = store.find_by_id("Account", id).unwrap().unwrap();
            copy.set("balance", 7);
            black_box(store.save(&copy).unwrap());
        });
    });
}

/// Benchmark saving a graph that admits a reachable customer.
fn bench_save_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("save_graph");

    for lines in [1, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, &lines| {
            let store = fixture_store();
            let quantities: Vec<i64> = (1..=lines as i64).collect();
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                let draft = order(&format!("c{n}@example.com"), &quantities);
                black_box(store.save(&draft).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark indexed lookups in populated stores.
fn bench_find_by_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_id");

    for entity_count in [100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(entity_count),
            entity_count,
            |b, &count| {
                let (store, ids) = populated(count);
                let mut rng = rand::thread_rng();
                b.iter(|| {
                    let id = ids[rng.gen_range(0..ids.len())].clone();
                    let result = store.find_by_id("Account", black_box(id)).unwrap();
                    black_box(result);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark scanning lookups once the id getter is dropped.
fn bench_find_by_scan(c: &mut Criterion) {
    c.bench_function("find_by_scan_1000", |b| {
        let (store, ids) = populated(1000);
        store.set_id_getter("Account", None).unwrap();
        let target = ids[ids.len() / 2].clone();
        b.iter(|| {
            let result = store.find_by_id("Account", black_box(target.clone())).unwrap();
            black_box(result);
        });
    });
}

/// Benchmark copying out a whole collection.
fn bench_find_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_all");

    for entity_count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*entity_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(entity_count),
            entity_count,
            |b, &count| {
                let (store, _) = populated(count);
                b.iter(|| {
                    let result = store.find_all(black_box("Account")).unwrap();
                    black_box(result);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark deletion.
fn bench_delete(c: &mut Criterion) {
    c.bench_function("delete", |b| {
        let store = fixture_store();

        b.iter_batched(
            || store.save(&account(1)).unwrap().get("id").clone(),
            |id| {
                store.delete_by_id("Account", black_box(id)).unwrap();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_single_save,
    bench_batch_save,
    bench_update,
    bench_save_graph,
    bench_find_by_id,
    bench_find_by_scan,
    bench_find_all,
    bench_delete,
);

criterion_main!(benches);
