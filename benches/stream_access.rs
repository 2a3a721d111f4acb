//! Stream Access Benchmarks
//!
//! Cost of positioning within a resource. `seek` rewinds to the start and
//! skips forward on every call, so its cost grows with the target offset;
//! a ranged read goes straight to the offset.
//!
//! Run with: `cargo bench --bench stream_access`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

use epub3_bridge::native::memory::{ArchiveSpec, MemoryNative, PackageSpec};
use epub3_bridge::{BridgeConfig, Container};

const RESOURCE_SIZE: usize = 4 * 1024 * 1024;
const CHUNK: usize = 4096;

fn open_container() -> Container {
    let native = Arc::new(MemoryNative::new());
    let body: Vec<u8> = (0..RESOURCE_SIZE).map(|i| (i % 251) as u8).collect();
    native.add_archive(
        "bench.epub",
        ArchiveSpec::new().with_package(PackageSpec::new().with_resource("audio.mp3", body)),
    );
    Container::open(native, "bench.epub", BridgeConfig::default())
        .expect("bench archive is registered")
}

fn bench_seek(c: &mut Criterion) {
    let container = open_container();
    let package = container.default_package().expect("one package");
    let mut stream = package.open_stream("audio.mp3", false).expect("resource exists");

    let mut group = c.benchmark_group("seek_then_read");
    group.throughput(Throughput::Bytes(CHUNK as u64));
    group.measurement_time(Duration::from_secs(5));

    for offset in [0u64, 64 * 1024, 1024 * 1024, 4 * 1024 * 1024 - CHUNK as u64] {
        group.bench_with_input(BenchmarkId::from_parameter(offset), &offset, |b, &offset| {
            b.iter(|| {
                stream.seek(black_box(offset)).expect("plain resource is seekable");
                black_box(stream.read(CHUNK))
            })
        });
    }

    group.finish();
    stream.close();
    container.close();
}

fn bench_range_read(c: &mut Criterion) {
    let container = open_container();
    let package = container.default_package().expect("one package");

    let mut group = c.benchmark_group("range_read");
    group.throughput(Throughput::Bytes(CHUNK as u64));
    group.measurement_time(Duration::from_secs(5));

    for offset in [0u64, 64 * 1024, 1024 * 1024, 4 * 1024 * 1024 - CHUNK as u64] {
        group.bench_with_input(BenchmarkId::from_parameter(offset), &offset, |b, &offset| {
            b.iter(|| black_box(package.resource("audio.mp3").read_range(black_box(offset), CHUNK)))
        });
    }

    group.finish();
    container.close();
}

criterion_group!(benches, bench_seek, bench_range_read);
criterion_main!(benches);
