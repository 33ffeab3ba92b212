//! Hot path benchmarks for profiling-driven optimization.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! Covers the per-record work done on every put and scan: reduction,
//! record encode/decode, ordered-set inserts and score range reads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pack_aggregator::keyspace::{Keyspace, OrderedSet};
use pack_aggregator::storage::codec;
use pack_aggregator::{reduce, Batch, Record};
use std::time::Duration;
use uuid::Uuid;

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");

    for len in [10, 100, 1000] {
        let batch = Batch::new(Uuid::new_v4(), 1, (0..len as i64).rev().collect());
        group.throughput(Throughput::Elements(len));
        group.bench_with_input(BenchmarkId::from_parameter(len), &batch, |b, batch| {
            b.iter(|| reduce(black_box(batch)))
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    let record = Record::new(Uuid::new_v4(), 1_700_000_000_000_000, 999);
    let frame = codec::encode(&record).unwrap();

    group.bench_function("encode", |b| b.iter(|| codec::encode(black_box(&record))));
    group.bench_function("decode", |b| b.iter(|| codec::decode(black_box(&frame))));

    group.finish();
}

fn bench_ordered_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordered_set");

    group.throughput(Throughput::Elements(1));
    group.bench_function("add", |b| {
        let mut set = OrderedSet::new();
        let mut score = 0i64;
        b.iter(|| {
            score += 1;
            set.add(Bytes::from(score.to_le_bytes().to_vec()), black_box(score))
        })
    });

    for size in [1_000u64, 10_000] {
        let mut set = OrderedSet::new();
        for i in 0..size as i64 {
            set.add(Bytes::from(i.to_le_bytes().to_vec()), i);
        }
        let mid = size as i64 / 2;
        group.throughput(Throughput::Elements(100));
        group.bench_with_input(BenchmarkId::new("range_100", size), &set, |b, set| {
            b.iter(|| set.range_by_score(black_box(mid), black_box(mid + 99)))
        });
    }

    group.finish();
}

fn bench_keyspace_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyspace_put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("zadd_then_set_ex", |b| {
        let mut keyspace = Keyspace::new();
        let ttl = Duration::from_secs(500);
        b.iter(|| {
            let record = Record::new(Uuid::new_v4(), 1, 2);
            let frame = codec::encode(&record).unwrap();
            keyspace.zadd("events", record.timestamp, frame.clone()).unwrap();
            keyspace.set_ex(&record.id.to_string(), frame, ttl).unwrap();
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_reduce,
    bench_codec,
    bench_ordered_set,
    bench_keyspace_put
);
criterion_main!(benches);
