use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pacer::{BucketConfig, CallOutcome, DualBucket, OrchestratorBuilder};
use std::time::Duration;
use tokio::runtime::Runtime;

/// A quota large enough that admission never waits during the benchmark.
fn wide_open_bucket() -> BucketConfig {
    BucketConfig::per_minute(6_000_000_000.0, 60_000_000_000.0)
}

fn bench_acquire(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let bucket = DualBucket::new(wide_open_bucket()).unwrap();

    c.bench_function("bucket_acquire_granted", |b| {
        b.iter(|| {
            runtime.block_on(async {
                black_box(bucket.acquire("bench", 1, Duration::from_secs(1)).await)
            })
        });
    });
}

fn bench_record_outcome(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let bucket = DualBucket::new(wide_open_bucket()).unwrap();

    c.bench_function("bucket_record_success", |b| {
        b.iter(|| {
            runtime.block_on(async {
                bucket
                    .record_outcome("bench", CallOutcome::Success, black_box(1))
                    .await
            })
        });
    });
}

fn bench_execute(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let orchestrator = OrchestratorBuilder::new().bucket(wide_open_bucket()).build();

    c.bench_function("orchestrator_execute_success", |b| {
        b.iter(|| {
            runtime.block_on(async {
                orchestrator
                    .execute("bench", 1, || async { Ok(black_box(42u64)) })
                    .await
                    .unwrap()
            })
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let bucket = DualBucket::new(wide_open_bucket()).unwrap();
    runtime.block_on(async {
        for endpoint in ["orders", "quotes", "trades", "account"] {
            bucket.record_outcome(endpoint, CallOutcome::Success, 1).await;
        }
    });

    c.bench_function("bucket_snapshot", |b| {
        b.iter(|| runtime.block_on(async { black_box(bucket.snapshot().await) }));
    });
}

criterion_group!(
    benches,
    bench_acquire,
    bench_record_outcome,
    bench_execute,
    bench_snapshot
);
criterion_main!(benches);
