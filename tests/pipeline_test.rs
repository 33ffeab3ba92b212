//! End-to-end ingest tests: producer → workers → store → metrics

use pack_aggregator::generator::BatchGenerator;
use pack_aggregator::storage::{SimulatedBackend, SimulatedBackendConfig};
use pack_aggregator::{
    AggregatorConfig, Batch, DualIndexStore, FailureReportGate, InMemoryBackend, IngestPipeline,
    QueryService, ServiceError,
};
use std::sync::Arc;
use uuid::Uuid;

async fn in_memory_service() -> Arc<QueryService<DualIndexStore<InMemoryBackend>>> {
    let service = Arc::new(QueryService::new(DualIndexStore::new(InMemoryBackend::new())));
    service.open().await.unwrap();
    service
}

fn config(workers_count: usize) -> AggregatorConfig {
    AggregatorConfig {
        workers_count,
        ..AggregatorConfig::default()
    }
}

#[tokio::test]
async fn test_ten_batches_three_workers() {
    let service = in_memory_service().await;
    let (input, running) = IngestPipeline::start(service.clone(), &config(3));

    let mut generator = BatchGenerator::new(11, 10, 1000).unwrap();
    let mut sent = Vec::new();
    for i in 0..10 {
        let batch = generator.next_batch_at(1_000 + i);
        sent.push(batch.clone());
        input.send(batch).await.unwrap();
    }
    drop(input);

    let (report, totals) = running.finish().await.unwrap();
    assert_eq!(totals.total(), 10);
    assert_eq!(totals.succeeded, 10);
    assert_eq!(report.processed(), 10);
    assert_eq!(report.workers.len(), 3);

    for batch in &sent {
        let record = service.get_by_id(batch.id).await.unwrap();
        assert_eq!(record.max, *batch.values.iter().max().unwrap());
        assert_eq!(record.timestamp, batch.timestamp);
    }
    assert_eq!(service.list_by_period(1_000, 1_009).await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_empty_batch_counted_as_failure() {
    let service = in_memory_service().await;
    let (input, running) = IngestPipeline::start(service.clone(), &config(2));

    let good = Batch::new(Uuid::new_v4(), 10, vec![4, 2]);
    let empty = Batch::new(Uuid::new_v4(), 20, vec![]);
    input.send(good.clone()).await.unwrap();
    input.send(empty.clone()).await.unwrap();
    input.send(Batch::new(Uuid::new_v4(), 30, vec![-5])).await.unwrap();
    drop(input);

    let (report, totals) = running.finish().await.unwrap();
    assert_eq!(totals.succeeded, 2);
    assert_eq!(totals.failed, 1);
    assert_eq!(report.failed(), 1);

    assert_eq!(service.get_by_id(good.id).await.unwrap().max, 4);
    assert_eq!(service.get_by_id(empty.id).await, Err(ServiceError::NotFound));
}

#[tokio::test]
async fn test_storage_failures_do_not_stall_queue() {
    let backend = SimulatedBackend::new(
        InMemoryBackend::new(),
        5,
        SimulatedBackendConfig::point_writes_rejected(),
    );
    let service = Arc::new(QueryService::new(DualIndexStore::new(backend)));
    service.open().await.unwrap();

    let config = AggregatorConfig {
        workers_count: 4,
        failure_report_gate: FailureReportGate::FailureCount,
        ..AggregatorConfig::default()
    };
    let (input, running) = IngestPipeline::start(service.clone(), &config);

    let mut generator = BatchGenerator::new(5, 4, 100).unwrap();
    for i in 0..25 {
        input.send(generator.next_batch_at(i)).await.unwrap();
    }
    drop(input);

    let (_, totals) = running.finish().await.unwrap();
    assert_eq!(totals.failed, 25);
    assert_eq!(totals.succeeded, 0);

    // the order index still saw every put
    assert_eq!(service.list_by_period(0, 24).await.unwrap().len(), 25);
}

#[tokio::test]
async fn test_no_input_finishes_cleanly() {
    let service = in_memory_service().await;
    let (input, running) = IngestPipeline::start(service, &config(5));
    drop(input);

    let (report, totals) = running.finish().await.unwrap();
    assert_eq!(totals.total(), 0);
    assert_eq!(report.processed(), 0);
    assert_eq!(report.workers.len(), 5);
}
