//! Graph copier benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entigraph_bench::chain_graph;
use entigraph_core::{
    BufferPool, Direction, GraphCopier, Heap, IdKind, TypeDescriptor, TypeRegistry, VersionKind,
};
use entigraph_testkit::{GRAPH_TYPE, NODE_TYPE};

fn graph_types() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types
        .register(
            TypeDescriptor::entity(GRAPH_TYPE)
                .id("id", IdKind::Long)
                .version("version", VersionKind::Long)
                .build()
                .unwrap(),
        )
        .unwrap();
    types
        .register(TypeDescriptor::embedded(NODE_TYPE).build().unwrap())
        .unwrap();
    types
}

/// Benchmark copying graphs of growing size.
fn bench_copy_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_width");
    let types = graph_types();
    let pool = BufferPool::new(4);

    for width in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*width as u64 + 1));
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, &width| {
            let copier = GraphCopier::new(&types, &pool, false);
            let source = chain_graph(width, 16);
            b.iter(|| {
                let mut target = Heap::new();
                let outcome = copier
                    .copy(
                        source.heap(),
                        &[source.root()],
                        &mut target,
                        Direction::Forward,
                    )
                    .unwrap();
                black_box(outcome);
            });
        });
    }
    group.finish();
}

/// Benchmark the cost of validating copies.
fn bench_copy_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_validation");
    let types = graph_types();
    let pool = BufferPool::new(4);
    let source = chain_graph(100, 64);

    for validate in [false, true] {
        group.bench_function(if validate { "validated" } else { "unchecked" }, |b| {
            let copier = GraphCopier::new(&types, &pool, validate);
            b.iter(|| {
                let mut target = Heap::new();
                let outcome = copier
                    .copy(
                        source.heap(),
                        &[source.root()],
                        &mut target,
                        Direction::Forward,
                    )
                    .unwrap();
                black_box(outcome);
            });
        });
    }
    group.finish();
}

/// Benchmark serializing graphs into images without decoding them.
fn bench_serialize(c: &mut Criterion) {
    let types = graph_types();
    let pool = BufferPool::new(4);
    let copier = GraphCopier::new(&types, &pool, false);
    let source = chain_graph(100, 256);

    c.bench_function("serialize_100", |b| {
        b.iter(|| {
            let image = copier.serialize(source.heap(), &[source.root()]).unwrap();
            black_box(image);
        });
    });
}

criterion_group!(benches, bench_copy_width, bench_copy_validation, bench_serialize);
criterion_main!(benches);
