//! Benchmarks for Reed-Solomon erasure coding
//!
//! Run with: cargo bench --package cumulus-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cumulus_core::erasure::{ErasureEncoder, ShardData};

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn bench_encode(c: &mut Criterion) {
    let encoder = ErasureEncoder::new().unwrap();
    let mut group = c.benchmark_group("erasure_encode");

    for size in [1024 * 1024, 16 * 1024 * 1024, 64 * 1024 * 1024] {
        let data = generate_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("sequential", format!("{}MB", size / (1024 * 1024))),
            &data,
            |b, data| b.iter(|| encoder.encode(black_box(data))),
        );
        group.bench_with_input(
            BenchmarkId::new("parallel", format!("{}MB", size / (1024 * 1024))),
            &data,
            |b, data| b.iter(|| encoder.encode_parallel(black_box(data))),
        );
    }

    group.finish();
}

/// Decode with the maximum number of shards missing
fn bench_decode_degraded(c: &mut Criterion) {
    let encoder = ErasureEncoder::new().unwrap();
    let mut group = c.benchmark_group("erasure_decode_degraded");

    for size in [1024 * 1024, 16 * 1024 * 1024] {
        let data = generate_data(size);
        let shards = encoder.encode(&data).unwrap();
        let mut opts: Vec<Option<ShardData>> = shards.into_iter().map(Some).collect();
        opts[0] = None;
        opts[3] = None;

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("two_missing", format!("{}MB", size / (1024 * 1024))),
            &opts,
            |b, opts| b.iter(|| encoder.decode(black_box(opts), size)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_degraded);
criterion_main!(benches);
