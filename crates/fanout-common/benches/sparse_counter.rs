//! Sparse counter benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fanout_common::{SparseCounter, TxResponse, TxStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

fn bench_single_thread(c: &mut Criterion) {
    let counter = SparseCounter::new();
    let plain = AtomicU64::new(0);

    c.bench_function("sparse_add", |b| b.iter(|| counter.add(black_box(1))));
    c.bench_function("atomic_add", |b| {
        b.iter(|| plain.fetch_add(black_box(1), Ordering::Relaxed))
    });
    c.bench_function("sparse_read", |b| b.iter(|| black_box(counter.read())));
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_add");

    for threads in [2usize, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            b.iter(|| {
                let stats = Arc::new(TxStats::default());
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let stats = stats.clone();
                        thread::spawn(move || {
                            for _ in 0..10_000 {
                                stats.record(TxResponse::new(1, 0));
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    let _ = h.join();
                }
                black_box(stats.snapshot())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_contended);
criterion_main!(benches);
