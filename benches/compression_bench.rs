#![allow(clippy::unwrap_used, clippy::uninlined_format_args)]

use afrs::transform::compression::{compress, decompress};
use afrs::transform::CompressionAlgorithm;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

/// Half repetitive, half counter bytes: compressible but not trivially so.
fn corpus(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| if i % 2 == 0 { b'a' } else { (i / 7) as u8 })
        .collect()
}

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");
    let sizes = [512usize, 4096, 65536, 1024 * 1024];
    let algorithms = [
        CompressionAlgorithm::Lz4,
        CompressionAlgorithm::Zstd,
        CompressionAlgorithm::Gzip,
        CompressionAlgorithm::Deflate,
    ];

    for &size in &sizes {
        let data = corpus(size);
        group.throughput(Throughput::Bytes(size as u64));
        for algorithm in algorithms {
            let name = algorithm.name().to_lowercase();
            group.bench_function(format!("{}_compress_{}b", name, size), |b| {
                b.iter_batched(
                    || data.clone(),
                    |d| {
                        let _ = compress(&d, algorithm, 0).unwrap();
                    },
                    BatchSize::SmallInput,
                )
            });
            group.bench_function(format!("{}_decompress_{}b", name, size), |b| {
                let compressed = compress(&data, algorithm, 0).unwrap();
                b.iter(|| {
                    let out = decompress(&compressed, algorithm, data.len()).unwrap();
                    assert_eq!(out.len(), data.len());
                })
            });
        }
    }

    group.finish();
}

fn bench_zstd_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("zstd_levels");
    let data = corpus(256 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));
    for level in [1, 3, 9, 19] {
        group.bench_function(format!("level_{}", level), |b| {
            b.iter(|| compress(&data, CompressionAlgorithm::Zstd, level).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compression, bench_zstd_levels);
criterion_main!(benches);
