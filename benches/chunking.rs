//! 청크 분할 + 다이제스트 벤치마크

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use chunkup::chunk::split_all;
use chunkup::{ContentDigest, Sha256Digest, MIB};

fn bench_split(c: &mut Criterion) {
    c.bench_function("split_all 10GiB / 10MiB", |b| {
        b.iter(|| split_all(black_box(10 * 1024 * MIB), black_box(10 * MIB)).count())
    });
}

fn bench_digest(c: &mut Criterion) {
    let data = vec![0xA5u8; MIB as usize];
    let mut group = c.benchmark_group("digest");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("sha256 1MiB", |b| b.iter(|| Sha256Digest.digest(black_box(&data))));
    group.finish();
}

criterion_group!(benches, bench_split, bench_digest);
criterion_main!(benches);
