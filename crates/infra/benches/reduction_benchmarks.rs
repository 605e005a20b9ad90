use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use serde_json::json;
use std::sync::Arc;

use sparkwatch_analytics::{JobRecord, TaskRecord};
use sparkwatch_core::JobStatus;
use sparkwatch_infra::store::ReductionBatch;
use sparkwatch_infra::{
    date_summary, AnalyticsStore, EventReducer, InMemoryAnalyticsStore, InMemoryWorkQueue,
    IngestService,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn job_start(job_id: i64) -> serde_json::Value {
    json!({
        "job_id": job_id,
        "event": "SparkListenerJobStart",
        "user": "bench",
        "timestamp": "2024-05-01T10:00:00"
    })
}

fn task_end(job_id: i64, task_id: &str) -> serde_json::Value {
    json!({
        "job_id": job_id,
        "event": "SparkListenerTaskEnd",
        "task_id": task_id,
        "timestamp": "2024-05-01T10:00:05",
        "duration_ms": 250,
        "successful": true
    })
}

fn job_end(job_id: i64) -> serde_json::Value {
    json!({
        "job_id": job_id,
        "event": "SparkListenerJobEnd",
        "completion_time": "2024-05-01T10:01:00",
        "job_result": "JobSucceeded"
    })
}

fn bench_ingest_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_latency");
    group.sample_size(1000);

    // Benchmark: accept a fresh start event (validation + guard + record + enqueue)
    group.bench_function("accept_job_start", |b| {
        let rt = runtime();
        let service = IngestService::new(
            Arc::new(InMemoryAnalyticsStore::new()),
            InMemoryWorkQueue::arc(),
        );
        let mut next_job_id = 0_i64;

        b.iter(|| {
            next_job_id += 1;
            rt.block_on(service.ingest(black_box(job_start(next_job_id))))
                .unwrap();
        });
    });

    // Benchmark: guard rejection against an already-reduced record
    group.bench_function("reject_duplicate_start", |b| {
        let rt = runtime();
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let service = IngestService::new(store.clone(), InMemoryWorkQueue::arc());

        rt.block_on(async {
            service.ingest(job_start(1)).await.unwrap();
            EventReducer::new(store.clone(), "bench-worker")
                .reduce_pending()
                .await
                .unwrap();
        });

        b.iter(|| {
            rt.block_on(service.ingest(black_box(job_start(1))))
                .unwrap_err();
        });
    });

    group.finish();
}

fn bench_reduction_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduction_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("ingest_and_drain", batch_size),
            batch_size,
            |b, &size| {
                let rt = runtime();
                let store = Arc::new(InMemoryAnalyticsStore::new());
                let reducer = EventReducer::new(store.clone(), "bench-worker");

                b.iter(|| {
                    rt.block_on(async {
                        for i in 0..size {
                            let job_id = (i / 4) as i64;
                            let (event_type, payload) = match i % 4 {
                                0 => ("SparkListenerJobStart", job_start(job_id)),
                                3 => ("SparkListenerJobEnd", job_end(job_id)),
                                _ => (
                                    "SparkListenerTaskEnd",
                                    task_end(job_id, &format!("t-{}", i)),
                                ),
                            };
                            store
                                .insert_raw_event(job_id, event_type, payload)
                                .await
                                .unwrap();
                        }
                        black_box(reducer.reduce_pending().await.unwrap());
                    });
                });
            },
        );
    }

    group.finish();
}

fn bench_summary_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("summary_assembly");

    for job_count in [10_usize, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("summarize_day", job_count),
            job_count,
            |b, &count| {
                let rt = runtime();
                let store = InMemoryAnalyticsStore::new();

                // Pre-seed one day of reduced records
                let mut jobs = Vec::with_capacity(count);
                let mut tasks = Vec::with_capacity(count * 4);
                for i in 0..count {
                    let job_id = i as i64;
                    jobs.push(JobRecord {
                        job_id,
                        user: Some("bench".to_string()),
                        start_time: Some("2024-05-01T10:00:00".to_string()),
                        end_time: Some("2024-05-01T10:01:40".to_string()),
                        status: Some(JobStatus::Success),
                    });
                    for t in 0..4 {
                        tasks.push(TaskRecord {
                            task_id: format!("t-{}-{}", job_id, t),
                            job_id,
                            timestamp: None,
                            duration_ms: Some(250),
                            successful: t % 4 != 0,
                        });
                    }
                }
                rt.block_on(store.commit_reduction(ReductionBatch {
                    jobs,
                    tasks,
                    processed_event_ids: Vec::new(),
                }))
                .unwrap();

                let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

                b.iter(|| {
                    black_box(rt.block_on(date_summary(&store, date)).unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ingest_latency,
    bench_reduction_throughput,
    bench_summary_assembly
);
criterion_main!(benches);
