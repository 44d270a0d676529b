//! RCU map hot-path benchmarks: read throughput under concurrent writes,
//! and the write-then-flush cost the dirty-buffer design trades for it.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use polaris_core::rcu::RcuMap;

fn bench_read_only(c: &mut Criterion) {
    let map: RcuMap<u32, u32> = RcuMap::new();
    for i in 0..1024u32 {
        map.update(i, i);
    }
    map.flush();

    let mut group = c.benchmark_group("rcu_get");
    group.bench_function("hit", |b| {
        b.iter(|| criterion::black_box(map.get(criterion::black_box(&512))));
    });
    group.bench_function("miss", |b| {
        b.iter(|| criterion::black_box(map.get(criterion::black_box(&u32::MAX))));
    });
    group.finish();
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("rcu_update");
    let sizes: &[usize] = &[1, 16, 256];

    for &n in sizes {
        group.bench_with_input(BenchmarkId::new("sequential", n), &n, |b, &n| {
            b.iter(|| {
                let map: RcuMap<u32, u32> = RcuMap::new();
                for i in 0..n as u32 {
                    map.update(i, i);
                }
                criterion::black_box(&map);
            });
        });
    }
    group.finish();
}

fn bench_concurrent_read_under_write(c: &mut Criterion) {
    let map = Arc::new(RcuMap::<u32, u32>::new());
    for i in 0..1024u32 {
        map.update(i, i);
    }
    map.flush();

    let writer_map = map.clone();
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let writer_stop = stop.clone();
    let writer = std::thread::spawn(move || {
        let mut i = 0u32;
        while !writer_stop.load(std::sync::atomic::Ordering::Relaxed) {
            writer_map.update(i % 1024, i);
            i = i.wrapping_add(1);
        }
    });

    c.bench_function("rcu_get_under_concurrent_writer", |b| {
        b.iter(|| criterion::black_box(map.get(criterion::black_box(&512))));
    });

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    writer.join().unwrap();
}

criterion_group!(benches, bench_read_only, bench_write, bench_concurrent_read_under_write);
criterion_main!(benches);
