//! 해시 / 핸드셰이크 인코딩 벤치마크

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rft::hasher::hash_bytes;
use rft::{sanitize_file_name, TransferRequest};

fn bench_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("sha256");
    for size in [4 * 1024usize, 1024 * 1024, 4 * 1024 * 1024] {
        let data = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| hash_bytes(black_box(data)))
        });
    }
    group.finish();
}

fn bench_handshake(c: &mut Criterion) {
    let request = TransferRequest::new("dataset-2024.tar", 7_340_032_000, "ab".repeat(32), true);
    let info = request.info_string();

    c.bench_function("handshake_encode", |b| b.iter(|| black_box(&request).encode()));
    c.bench_function("handshake_parse", |b| {
        b.iter(|| TransferRequest::parse(black_box(&info)))
    });
    c.bench_function("sanitize_file_name", |b| {
        b.iter(|| sanitize_file_name(black_box("../../a/b\\..\\..secret....txt")))
    });
}

criterion_group!(benches, bench_hash, bench_handshake);
criterion_main!(benches);
