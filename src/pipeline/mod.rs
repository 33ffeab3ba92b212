//! Ingestion pipeline
//!
//! ```text
//! producer ──► input queue ──► N workers ──► reduce ──► QueryService::put
//!                                   │
//!                                   └──► outcome queue ──► MetricsSink
//! ```
//!
//! Dropping the producer sender is the only shutdown signal. Workers exit
//! once the input queue is drained and closed; a supervisor task waits for
//! all of them and then drops the last outcome sender, which ends the
//! metrics sink.

mod worker;

pub use worker::{process_batch, SharedInput, WorkerStats};

use crate::config::AggregatorConfig;
use crate::metrics::{MetricsSink, ProcessingTotals};
use crate::model::Batch;
use crate::service::QueryService;
use crate::storage::RecordStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline task failed: {0}")]
    Task(#[from] JoinError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub workers: Vec<WorkerStats>,
    /// Workers that panicked and left no stats
    pub crashed_workers: usize,
}

impl PipelineReport {
    pub fn processed(&self) -> u64 {
        self.workers.iter().map(|w| w.processed).sum()
    }

    pub fn failed(&self) -> u64 {
        self.workers.iter().map(|w| w.failed).sum()
    }
}

/// Supervisor handle for a spawned worker pool
pub struct PipelineHandle {
    supervisor: JoinHandle<PipelineReport>,
}

impl PipelineHandle {
    /// Wait for every worker to exit. Completes only after the input queue closes.
    pub async fn join(self) -> Result<PipelineReport, PipelineError> {
        Ok(self.supervisor.await?)
    }
}

pub struct IngestPipeline;

impl IngestPipeline {
    /// Spawn `workers_count` workers draining `input` and a supervisor that
    /// owns `outcomes` and drops it once all workers have exited.
    pub fn spawn<S: RecordStore>(
        service: Arc<QueryService<S>>,
        input: mpsc::Receiver<Batch>,
        outcomes: mpsc::Sender<bool>,
        workers_count: usize,
    ) -> PipelineHandle {
        let input: SharedInput = Arc::new(Mutex::new(input));

        let workers: Vec<JoinHandle<WorkerStats>> = (0..workers_count.max(1))
            .map(|worker_id| {
                tokio::spawn(worker::run_worker(
                    worker_id,
                    service.clone(),
                    input.clone(),
                    outcomes.clone(),
                ))
            })
            .collect();
        info!(workers = workers.len(), "ingest workers started");

        let supervisor = tokio::spawn(async move {
            let results = futures::future::join_all(workers).await;
            drop(outcomes);

            let mut report = PipelineReport::default();
            for result in results {
                match result {
                    Ok(stats) => report.workers.push(stats),
                    Err(e) => {
                        error!(error = %e, "ingest worker crashed");
                        report.crashed_workers += 1;
                    }
                }
            }
            info!(
                processed = report.processed(),
                failed = report.failed(),
                "all ingest workers stopped"
            );
            report
        });

        PipelineHandle { supervisor }
    }

    /// Spawn the metrics sink and the worker pool wired per `config`.
    ///
    /// Returns the producer side of the input queue; drop it to shut down.
    pub fn start<S: RecordStore>(
        service: Arc<QueryService<S>>,
        config: &AggregatorConfig,
    ) -> (mpsc::Sender<Batch>, RunningIngest) {
        let (input_tx, input_rx) = mpsc::channel(config.input_queue_capacity.max(1));
        let (outcome_tx, outcome_rx) = mpsc::channel(config.outcome_queue_capacity.max(1));

        let sink = MetricsSink::new(config.metrics_batch_size, config.failure_report_gate);
        let metrics = tokio::spawn(sink.run(outcome_rx));
        let pipeline = Self::spawn(service, input_rx, outcome_tx, config.workers_count);

        (input_tx, RunningIngest { pipeline, metrics })
    }
}

/// A started pipeline with its metrics sink
pub struct RunningIngest {
    pipeline: PipelineHandle,
    metrics: JoinHandle<ProcessingTotals>,
}

impl RunningIngest {
    /// Wait for the workers and the metrics sink to drain.
    ///
    /// The producer sender must have been dropped, or this never completes.
    pub async fn finish(self) -> Result<(PipelineReport, ProcessingTotals), PipelineError> {
        let report = self.pipeline.join().await?;
        let totals = self.metrics.await?;
        Ok((report, totals))
    }
}
