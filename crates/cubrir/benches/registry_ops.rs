//! Registry Operations Benchmarks
//!
//! Benchmarks for slot allocation, update application, and metrics rollup.
//!
//! Run with: `cargo bench --bench registry_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jugar_cubrir::{
    AggregateProvider, ClassBuilder, ContextStore, CoverageRegistry, InstrumentationUpdate,
    MethodBuilder, PackageDelta, SlotCursor, SourceFileBuilder, SourceFileInfo,
};
use std::sync::Arc;

fn build_file(name: &str, classes: usize, methods: usize, cursor: &mut SlotCursor) -> SourceFileInfo {
    let mut builder = SourceFileBuilder::new(name);
    for c in 0..classes {
        let mut class = ClassBuilder::new(&format!("C{c}"), c as u32 * 50 + 1);
        for m in 0..methods {
            class = class.method(
                MethodBuilder::new(&format!("m{m}"), (c * 50 + m * 4) as u32 + 2)
                    .statement(1)
                    .statement(2)
                    .branch(3),
            );
        }
        builder = builder.class(class);
    }
    builder.build(cursor)
}

fn registry_with_files(files: usize) -> CoverageRegistry {
    let registry = CoverageRegistry::new("bench");
    let mut cursor = SlotCursor::new();
    let built: Vec<SourceFileInfo> = (0..files)
        .map(|i| build_file(&format!("file{i}.rs"), 4, 6, &mut cursor))
        .collect();
    let update = InstrumentationUpdate::new(
        1,
        0,
        1,
        cursor.position(),
        vec![PackageDelta::new("bench", built)],
        ContextStore::new(),
    );
    registry.apply_update(0, &update).unwrap();
    registry
}

fn bench_slot_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_allocation");

    for &(classes, methods) in &[(2usize, 4usize), (8, 8), (16, 16)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{classes}x{methods}")),
            &(classes, methods),
            |bench, &(classes, methods)| {
                bench.iter(|| {
                    let mut cursor = SlotCursor::new();
                    let file = build_file("gen.rs", classes, methods, &mut cursor);
                    black_box(file);
                });
            },
        );
    }

    group.finish();
}

fn bench_update_application(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_application");

    for &files in &[1usize, 16, 64] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{files}_files")),
            &files,
            |bench, &files| {
                bench.iter(|| {
                    let registry = registry_with_files(files);
                    black_box(registry.slot_count());
                });
            },
        );
    }

    group.finish();
}

fn bench_metrics_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics_fold");

    for &files in &[1usize, 16, 64] {
        let registry = registry_with_files(files);
        let counts = (0..registry.slot_count() as u64).map(|i| i % 3).collect();
        registry.attach_provider(Arc::new(AggregateProvider::new(counts)));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{files}_files")),
            &registry,
            |bench, registry| {
                bench.iter(|| {
                    // Swap-free cached query after the first iteration
                    black_box(registry.project_metrics());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_slot_allocation,
    bench_update_application,
    bench_metrics_fold
);
criterion_main!(benches);
