// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Core B+Tree operation benchmarks.
//!
//! Measures:
//! - insert() - insert a key, including occasional leaf/interior splits
//! - search() - point lookup
//! - iter_forward() - full ascending scan
//! - remove() - delete a key, including occasional leaf unlink

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use heapbtree::{BPlusTree, FileHeap, IntegerCodec, StringCodec};
use tempfile::NamedTempFile;

fn build_tree(n: usize, keys_per_node: usize) -> (NamedTempFile, BPlusTree<String, i64>) {
    let file = NamedTempFile::new().unwrap();
    let heap = FileHeap::create(file.path()).unwrap();
    let mut tree = BPlusTree::create(
        Box::new(heap),
        Box::new(StringCodec::new(16)),
        Box::new(IntegerCodec),
        keys_per_node,
    )
    .unwrap();
    for i in 0..n {
        tree.insert(format!("k{:08}", i), i as i64).unwrap();
    }
    (file, tree)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &n in &[100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || build_tree(n, 32),
                |(_file, mut tree)| {
                    black_box(tree.insert(format!("k{:08}", n), n as i64).unwrap());
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    for &n in &[100usize, 1_000, 10_000] {
        let (_file, mut tree) = build_tree(n, 32);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let key = format!("k{:08}", n / 2);
            b.iter(|| {
                black_box(tree.search(&key).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_iter_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("iter_forward");
    group.sample_size(20);
    for &n in &[100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let (_file, mut tree) = build_tree(n, 32);
            b.iter(|| {
                let count = tree.iter_forward().count();
                black_box(count);
            });
        });
    }
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove");
    group.sample_size(20);
    for &n in &[100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || build_tree(n, 32),
                |(_file, mut tree)| {
                    black_box(tree.remove(&format!("k{:08}", n / 2)).unwrap());
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search, bench_iter_forward, bench_remove);
criterion_main!(benches);
