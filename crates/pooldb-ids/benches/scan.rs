//! Gap scan throughput over dense and sparse columns.

#![allow(missing_docs)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hashbrown::HashSet;
use pooldb_ids::GapScanner;

fn scan(column: &[i64], amount: usize, reserved: &HashSet<i64>) -> usize {
    let mut scanner = GapScanner::new(amount, reserved);
    for &value in column {
        if scanner.is_complete() {
            break;
        }
        scanner.feed(value);
    }
    scanner.finish().map(|outcome| outcome.ids.len()).unwrap_or(0)
}

fn bench_dense(c: &mut Criterion) {
    let mut group = c.benchmark_group("gap_scan_dense");
    let reserved = HashSet::new();

    for rows in [1_000i64, 100_000] {
        // every id taken, so the scan reads the whole column
        let column: Vec<i64> = (0..rows).collect();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &column, |b, column| {
            b.iter(|| scan(black_box(column), 100, &reserved));
        });
    }

    group.finish();
}

fn bench_sparse(c: &mut Criterion) {
    let mut group = c.benchmark_group("gap_scan_sparse");
    // one id in ten freed by deletes
    let column: Vec<i64> = (0..100_000).filter(|id| id % 10 != 0).collect();

    for outstanding in [0i64, 1_000] {
        let reserved: HashSet<i64> = (0..outstanding).map(|i| i * 10).collect();
        group.bench_with_input(
            BenchmarkId::new("outstanding", outstanding),
            &reserved,
            |b, reserved| {
                b.iter(|| scan(black_box(&column), 100, reserved));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_dense, bench_sparse);
criterion_main!(benches);
