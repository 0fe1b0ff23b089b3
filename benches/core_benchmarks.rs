//! Stream and upload throughput.
//!
//! Run with:
//!   cargo bench --bench core_benchmarks

use std::io::Read;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use object_store::memory::InMemory;
use object_store::ObjectStore;
use rand::prelude::*;

use zeppelin_remote_build::repository::{DefaultVectorRepositoryAccessor, VectorRepositoryAccessor};
use zeppelin_remote_build::storage::{ObjectStoreBlobContainer, UploadOptions};
use zeppelin_remote_build::stream::VectorValuesStream;
use zeppelin_remote_build::types::{KnnEngine, VectorDataType};
use zeppelin_remote_build::vectors::{InMemoryVectors, KnnVectorValuesSupplier};

fn generate_vectors(n: usize, dim: usize, seed: u64) -> InMemoryVectors {
    let mut rng = StdRng::seed_from_u64(seed);
    let vectors = (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    InMemoryVectors::from_floats(dim, vectors).unwrap()
}

fn bench_full_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_stream");
    for dim in [32usize, 128, 768] {
        let vectors = generate_vectors(10_000, dim, 42);
        group.throughput(Throughput::Bytes(vectors.vector_blob_length()));
        group.bench_with_input(BenchmarkId::new("full", dim), &vectors, |b, vectors| {
            let mut buf = vec![0u8; 64 * 1024];
            b.iter(|| {
                let mut stream = VectorValuesStream::open(vectors, VectorDataType::Float).unwrap();
                let mut total = 0usize;
                loop {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    total += n;
                }
                black_box(total)
            });
        });
    }
    group.finish();
}

fn bench_positioned_stream(c: &mut Criterion) {
    let vectors = generate_vectors(10_000, 128, 7);
    let total = vectors.vector_blob_length();
    let mut group = c.benchmark_group("vector_stream");
    group.throughput(Throughput::Bytes(total / 4));
    // Last quarter, starting mid-record: every earlier record is skipped.
    group.bench_function("positioned_tail", |b| {
        b.iter(|| {
            let start = total - total / 4 + 3;
            let mut stream =
                VectorValuesStream::open_range(&vectors, VectorDataType::Float, start, total / 4)
                    .unwrap();
            let mut out = Vec::with_capacity((total / 4) as usize);
            stream.read_to_end(&mut out).unwrap();
            black_box(out.len())
        });
    });
    group.finish();
}

fn bench_parallel_upload(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let vectors = generate_vectors(20_000, 128, 11);
    let supplier: Arc<dyn KnnVectorValuesSupplier> = Arc::new(vectors.clone());

    let mut group = c.benchmark_group("repository_write");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(vectors.vector_blob_length()));
    for part_size in [256 * 1024u64, 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("in_memory", part_size),
            &part_size,
            |b, &part_size| {
                b.iter(|| {
                    rt.block_on(async {
                        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
                        let container = ObjectStoreBlobContainer::new(
                            store,
                            "bench",
                            UploadOptions {
                                part_size,
                                max_concurrency: 8,
                                parallel_upload: true,
                            },
                        );
                        let accessor =
                            DefaultVectorRepositoryAccessor::new(Arc::new(container), KnnEngine::Faiss);
                        accessor
                            .write_to_repository(
                                "blob",
                                vectors.len() as u64,
                                VectorDataType::Float,
                                supplier.clone(),
                            )
                            .await
                            .unwrap();
                    })
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_full_stream,
    bench_positioned_stream,
    bench_parallel_upload
);
criterion_main!(benches);
