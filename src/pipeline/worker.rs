use crate::model::{reduce, Batch};
use crate::service::{QueryService, ServiceError};
use crate::storage::RecordStore;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Input queue shared by every worker; whoever holds the lock receives next.
pub type SharedInput = Arc<Mutex<mpsc::Receiver<Batch>>>;

/// Per-worker counters returned when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub processed: u64,
    pub failed: u64,
}

/// Reduce one batch and persist the result.
pub async fn process_batch<S: RecordStore>(
    service: &QueryService<S>,
    batch: Batch,
) -> Result<(), ServiceError> {
    let record = reduce(&batch)?;
    service.put(record).await
}

pub(crate) async fn run_worker<S: RecordStore>(
    worker_id: usize,
    service: Arc<QueryService<S>>,
    input: SharedInput,
    outcomes: mpsc::Sender<bool>,
) -> WorkerStats {
    let mut stats = WorkerStats {
        worker_id,
        ..WorkerStats::default()
    };

    loop {
        let batch = input.lock().await.recv().await;
        let Some(batch) = batch else {
            break;
        };
        let batch_id = batch.id;

        let succeeded = match process_batch(&service, batch).await {
            Ok(()) => true,
            Err(e) => {
                warn!(worker_id, %batch_id, error = %e, "batch processing failed");
                stats.failed += 1;
                false
            }
        };
        stats.processed += 1;

        if outcomes.send(succeeded).await.is_err() {
            debug!(worker_id, "outcome receiver gone, outcome dropped");
        }
    }

    debug!(worker_id, processed = stats.processed, failed = stats.failed, "worker exiting");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DualIndexStore, InMemoryBackend};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_process_batch_stores_max() {
        let service = QueryService::new(DualIndexStore::new(InMemoryBackend::new()));
        service.open().await.unwrap();

        let id = Uuid::new_v4();
        process_batch(&service, Batch::new(id, 7, vec![3, 9, -1]))
            .await
            .unwrap();
        assert_eq!(service.get_by_id(id).await.unwrap().max, 9);
    }

    #[tokio::test]
    async fn test_process_empty_batch_is_invalid_input() {
        let service = QueryService::new(DualIndexStore::new(InMemoryBackend::new()));
        service.open().await.unwrap();

        let err = process_batch(&service, Batch::new(Uuid::new_v4(), 7, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_worker_reports_every_batch() {
        let service = Arc::new(QueryService::new(DualIndexStore::new(InMemoryBackend::new())));
        service.open().await.unwrap();

        let (input_tx, input_rx) = mpsc::channel(4);
        let (outcome_tx, mut outcome_rx) = mpsc::channel(4);
        let input = Arc::new(Mutex::new(input_rx));
        let worker = tokio::spawn(run_worker(0, service, input, outcome_tx));

        input_tx.send(Batch::new(Uuid::new_v4(), 1, vec![1])).await.unwrap();
        input_tx.send(Batch::new(Uuid::new_v4(), 2, vec![])).await.unwrap();
        drop(input_tx);

        assert_eq!(outcome_rx.recv().await, Some(true));
        assert_eq!(outcome_rx.recv().await, Some(false));

        let stats = worker.await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(outcome_rx.recv().await, None);
    }
}
