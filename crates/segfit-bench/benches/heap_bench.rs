//! Allocator benchmarks.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use segfit_core::{Heap, HeapConfig};

fn bench_allocate_release_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 64, 256, 1024, 4096];
    let mut group = c.benchmark_group("allocate_release_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("segfit", size), &size, |b, &sz| {
            let mut heap = Heap::new();
            b.iter(|| {
                let p = heap.allocate(sz).unwrap();
                heap.release(criterion::black_box(p));
            });
        });
    }
    group.finish();
}

fn bench_allocation_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_burst");

    group.bench_function("1000x64B", |b| {
        let mut heap = Heap::with_config(HeapConfig {
            chunk_bytes: 4096,
            max_heap_bytes: 16 << 20,
        });
        let mut ptrs = Vec::with_capacity(1000);
        b.iter(|| {
            for _ in 0..1000 {
                ptrs.push(heap.allocate(64).unwrap());
            }
            for p in ptrs.drain(..) {
                heap.release(criterion::black_box(p));
            }
        });
    });

    group.finish();
}

fn bench_realloc_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("realloc_growth");

    group.bench_function("64B_to_4KiB", |b| {
        let mut heap = Heap::new();
        b.iter(|| {
            let mut p = heap.allocate(64).unwrap();
            for size in [128, 512, 1024, 4096] {
                p = heap.reallocate(p, size).unwrap();
            }
            heap.release(criterion::black_box(p));
        });
    });

    group.finish();
}

fn bench_mixed_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_stream");

    group.bench_function("interleaved_small_large", |b| {
        let mut heap = Heap::new();
        let mut live = Vec::with_capacity(64);
        let mut tick = 0usize;
        b.iter(|| {
            tick = tick.wrapping_add(1);
            let size = if tick % 7 == 0 { 2048 } else { 24 + tick % 200 };
            if live.len() == 64 {
                heap.release(live.swap_remove(tick % 64));
            }
            live.push(heap.allocate(criterion::black_box(size)).unwrap());
        });
        for p in live.drain(..) {
            heap.release(p);
        }
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_allocate_release_cycle,
    bench_allocation_burst,
    bench_realloc_growth,
    bench_mixed_stream
);
criterion_main!(benches);
