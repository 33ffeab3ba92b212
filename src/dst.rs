//! Deterministic simulation testing for the ingest pipeline
//!
//! Each run generates a seeded workload (optionally sprinkled with empty
//! batches), pushes it through the full pipeline over a fault-injecting
//! backend, then inspects the underlying keyspace through a separate
//! fault-free connection and checks:
//!
//! - every batch produced exactly one outcome
//! - each successful batch is retrievable by id with the right summary value
//! - no empty batch was stored
//! - every retrievable record is reachable by range scan
//! - the order index holds exactly one entry per put that got past its order write
//!
//! With one worker a seed replays exactly. With more workers, fault draws
//! interleave with scheduling and only the invariants are stable.

use crate::config::AggregatorConfig;
use crate::generator::{BatchGenerator, GeneratorError};
use crate::model::Batch;
use crate::pipeline::IngestPipeline;
use crate::service::QueryService;
use crate::simulator::DeterministicRng;
use crate::storage::{
    DualIndexStore, InMemoryBackend, RecordStore, SimulatedBackend, SimulatedBackendConfig,
    SimulatedBackendStats, StorageError,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const BASE_TIMESTAMP_US: i64 = 1_700_000_000_000_000;

#[derive(Debug, Clone)]
pub struct PipelineDSTConfig {
    pub seed: u64,
    pub backend_config: SimulatedBackendConfig,
    pub workers_count: usize,
    /// Probability that a generated batch carries no values
    pub empty_batch_probability: f64,
    pub pack_length: usize,
    pub value_limit: i64,
}

impl Default for PipelineDSTConfig {
    fn default() -> Self {
        PipelineDSTConfig {
            seed: 0,
            backend_config: SimulatedBackendConfig::default(),
            workers_count: 3,
            empty_batch_probability: 0.05,
            pack_length: 10,
            value_limit: 1000,
        }
    }
}

impl PipelineDSTConfig {
    pub fn new(seed: u64) -> Self {
        PipelineDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// No backend faults, no empty batches
    pub fn calm(seed: u64) -> Self {
        PipelineDSTConfig {
            seed,
            backend_config: SimulatedBackendConfig::no_faults(),
            empty_batch_probability: 0.0,
            ..Default::default()
        }
    }

    pub fn moderate(seed: u64) -> Self {
        PipelineDSTConfig {
            seed,
            ..Default::default()
        }
    }

    pub fn chaos(seed: u64) -> Self {
        PipelineDSTConfig {
            seed,
            backend_config: SimulatedBackendConfig::high_chaos(),
            workers_count: 5,
            empty_batch_probability: 0.1,
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum DSTSetupError {
    #[error("store setup failed: {0}")]
    Storage(#[from] StorageError),
    #[error("workload setup failed: {0}")]
    Generator(#[from] GeneratorError),
}

#[derive(Debug, Clone)]
pub struct PipelineDSTResult {
    pub seed: u64,
    pub batches: u64,
    pub empty_batches: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Puts whose order write landed but point write did not
    pub partial_puts: u64,
    pub backend_stats: SimulatedBackendStats,
    pub invariant_violations: Vec<String>,
}

impl PipelineDSTResult {
    pub fn new(seed: u64) -> Self {
        PipelineDSTResult {
            seed,
            batches: 0,
            empty_batches: 0,
            succeeded: 0,
            failed: 0,
            partial_puts: 0,
            backend_stats: SimulatedBackendStats::default(),
            invariant_violations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} batches ({} ok, {} failed, {} empty), {} partial puts, {} violations",
            self.seed,
            self.batches,
            self.succeeded,
            self.failed,
            self.empty_batches,
            self.partial_puts,
            self.invariant_violations.len()
        )
    }
}

type DSTStore = DualIndexStore<SimulatedBackend<InMemoryBackend>>;

pub struct PipelineDSTHarness {
    config: PipelineDSTConfig,
    service: Arc<QueryService<DSTStore>>,
    /// Fault-free connection to the same keyspace
    oracle: DualIndexStore<InMemoryBackend>,
    rng: DeterministicRng,
    generator: BatchGenerator,
    /// Expected summary value per non-empty batch
    expected: HashMap<Uuid, i64>,
    empty_ids: Vec<Uuid>,
    next_timestamp: i64,
    result: PipelineDSTResult,
}

impl PipelineDSTHarness {
    pub async fn new(config: PipelineDSTConfig) -> Result<Self, DSTSetupError> {
        let inner = InMemoryBackend::new();
        let oracle = DualIndexStore::new(inner.clone());
        let backend = SimulatedBackend::new(
            inner,
            config.seed.wrapping_add(1),
            config.backend_config.clone(),
        );
        let store = DualIndexStore::new(backend);
        store.open().await?;
        oracle.open().await?;

        let generator = BatchGenerator::new(
            config.seed.wrapping_add(2),
            config.pack_length,
            config.value_limit,
        )?;

        Ok(PipelineDSTHarness {
            rng: DeterministicRng::new(config.seed),
            result: PipelineDSTResult::new(config.seed),
            config,
            service: Arc::new(QueryService::new(store)),
            oracle,
            generator,
            expected: HashMap::new(),
            empty_ids: Vec::new(),
            next_timestamp: BASE_TIMESTAMP_US,
        })
    }

    fn next_batch(&mut self) -> Batch {
        // occasional duplicate timestamps exercise tie ordering
        if !self.rng.gen_bool(0.1) {
            self.next_timestamp += self.rng.gen_range(1, 1_000) as i64;
        }
        let mut batch = self.generator.next_batch_at(self.next_timestamp);

        if self.rng.gen_bool(self.config.empty_batch_probability) {
            batch.values.clear();
            self.empty_ids.push(batch.id);
            self.result.empty_batches += 1;
        } else if let Some(max) = batch.values.iter().copied().max() {
            self.expected.insert(batch.id, max);
        }
        batch
    }

    /// Push `batches` generated batches through a fresh pipeline and drain it.
    pub async fn run(&mut self, batches: usize) {
        let config = AggregatorConfig {
            workers_count: self.config.workers_count,
            ..AggregatorConfig::default()
        };
        let (input, running) = IngestPipeline::start(self.service.clone(), &config);

        for _ in 0..batches {
            let batch = self.next_batch();
            self.result.batches += 1;
            if input.send(batch).await.is_err() {
                self.violation("input queue closed while producing".to_string());
                break;
            }
        }
        drop(input);

        match running.finish().await {
            Ok((report, totals)) => {
                self.result.succeeded += totals.succeeded;
                self.result.failed += totals.failed;
                if report.processed() != totals.total() {
                    self.violation(format!(
                        "workers processed {} batches but metrics counted {}",
                        report.processed(),
                        totals.total()
                    ));
                }
                if report.failed() != totals.failed {
                    self.violation(format!(
                        "workers failed {} batches but metrics counted {}",
                        report.failed(),
                        totals.failed
                    ));
                }
            }
            Err(e) => self.violation(format!("pipeline did not finish cleanly: {}", e)),
        }
    }

    pub async fn check_invariants(&mut self) {
        let stats = self.service.store().backend().stats();
        self.result.backend_stats = stats.clone();

        if self.result.succeeded + self.result.failed != self.result.batches {
            self.violation(format!(
                "{} batches produced {} outcomes",
                self.result.batches,
                self.result.succeeded + self.result.failed
            ));
        }

        // Each point write is attempted only after its order write landed.
        self.result.partial_puts = stats.set_attempts.saturating_sub(self.result.succeeded);
        let order_index = self.oracle.backend().keyspace().with_lock(|ks| {
            ks.sorted_set(self.oracle.order_key())
                .map(|zset| zset.map_or((0, true), |z| (z.len(), z.is_sorted())))
        });
        match order_index {
            Ok((count, sorted)) => {
                if count as u64 != stats.set_attempts {
                    self.violation(format!(
                        "order index holds {} entries, expected {}",
                        count, stats.set_attempts
                    ));
                }
                if !sorted {
                    self.violation("order index scores out of order".to_string());
                }
            }
            Err(e) => self.violation(format!("order index unreadable: {}", e)),
        }

        let scan = self.oracle.list_by_period(i64::MIN, i64::MAX).await;
        let scanned: HashMap<Uuid, i64> = match scan {
            Ok(records) => {
                if records.windows(2).any(|w| w[0].timestamp > w[1].timestamp) {
                    self.violation("range scan not ascending by timestamp".to_string());
                }
                records.into_iter().map(|r| (r.id, r.max)).collect()
            }
            Err(StorageError::NotFound) => HashMap::new(),
            Err(e) => {
                self.violation(format!("range scan failed on fault-free connection: {}", e));
                HashMap::new()
            }
        };

        let mut retrievable = 0u64;
        let expected: Vec<(Uuid, i64)> = self.expected.iter().map(|(k, v)| (*k, *v)).collect();
        for (id, max) in expected {
            let lookup = self.oracle.get_by_id(id).await;
            match lookup {
                Ok(record) => {
                    retrievable += 1;
                    if record.max != max {
                        self.violation(format!(
                            "record {} has max {}, expected {}",
                            id, record.max, max
                        ));
                    }
                    if scanned.get(&id) != Some(&max) {
                        self.violation(format!("record {} missing from range scan", id));
                    }
                }
                Err(StorageError::NotFound) => {}
                Err(e) => self.violation(format!("record {} unreadable: {}", id, e)),
            }
        }
        if retrievable != self.result.succeeded {
            self.violation(format!(
                "{} records retrievable by id, {} batches succeeded",
                retrievable, self.result.succeeded
            ));
        }

        let empty_ids = self.empty_ids.clone();
        for id in empty_ids {
            let stored = self.oracle.get_by_id(id).await.is_ok();
            if stored || scanned.contains_key(&id) {
                self.violation(format!("empty batch {} was stored", id));
            }
        }
    }

    fn violation(&mut self, message: String) {
        self.result
            .invariant_violations
            .push(format!("seed {}: {}", self.config.seed, message));
    }

    pub fn result(&self) -> &PipelineDSTResult {
        &self.result
    }

    pub fn into_result(self) -> PipelineDSTResult {
        self.result
    }
}

/// Run one harness per seed in `base_seed..base_seed + count`
pub async fn run_dst_batch(
    base_seed: u64,
    count: usize,
    batches_per_run: usize,
    config_fn: impl Fn(u64) -> PipelineDSTConfig,
) -> Vec<PipelineDSTResult> {
    let mut results = Vec::with_capacity(count);

    for i in 0..count {
        let seed = base_seed + i as u64;
        let mut harness = match PipelineDSTHarness::new(config_fn(seed)).await {
            Ok(harness) => harness,
            Err(e) => {
                let mut result = PipelineDSTResult::new(seed);
                result
                    .invariant_violations
                    .push(format!("seed {}: harness setup failed: {}", seed, e));
                results.push(result);
                continue;
            }
        };
        harness.run(batches_per_run).await;
        harness.check_invariants().await;
        results.push(harness.into_result());
    }

    results
}

pub fn summarize_batch(results: &[PipelineDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed_seeds: Vec<u64> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.seed)
        .collect();

    let total_batches: u64 = results.iter().map(|r| r.batches).sum();
    let total_failed: u64 = results.iter().map(|r| r.failed).sum();
    let total_partial: u64 = results.iter().map(|r| r.partial_puts).sum();

    let mut summary = format!(
        "Batch: {}/{} passed, {} batches, {} failed, {} partial puts",
        passed, total, total_batches, total_failed, total_partial
    );

    if !failed_seeds.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed_seeds));
    }

    summary
}
