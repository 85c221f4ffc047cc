use criterion::{black_box, criterion_group, criterion_main, Criterion};
use changefeed_core::position::{ChangefeedPosition, PartitionPosition, PartitionRange};

fn checkpoint(partitions: i64, lsn: i64) -> ChangefeedPosition {
    let width = i64::MAX / partitions;
    (0..partitions)
        .map(|n| {
            PartitionPosition::new(
                PartitionRange::new(format!("p{n}"), n * width, (n + 1) * width - 1),
                lsn,
            )
        })
        .collect()
}

fn benchmark_merge(c: &mut Criterion) {
    let running = checkpoint(256, 1_000);
    let update = PartitionPosition::new(PartitionRange::new("p128", 0, 1), 1_001);

    c.bench_function("merge_into_256_partitions", |b| {
        b.iter(|| black_box(&running).merge(black_box(update.clone())))
    });
}

fn benchmark_succeeds(c: &mut Criterion) {
    let ahead = checkpoint(64, 2_000);
    let behind = checkpoint(64, 1_000);

    c.bench_function("succeeds_64_partitions", |b| {
        b.iter(|| black_box(&behind).succeeds(black_box(&ahead)))
    });
}

fn benchmark_checkpoint_json(c: &mut Criterion) {
    let running = checkpoint(64, 1_000);

    c.bench_function("checkpoint_to_json_64_partitions", |b| {
        b.iter(|| black_box(&running).to_json())
    });
}

criterion_group!(benches, benchmark_merge, benchmark_succeeds, benchmark_checkpoint_json);
criterion_main!(benches);
