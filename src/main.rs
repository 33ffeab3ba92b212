//! Pack aggregator demo process
//!
//! Generates synthetic packs, runs them through the ingest pipeline into an
//! in-process dual-index store, then runs one range query over what landed.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | AGGREGATOR_CONFIG | - | TOML config file |
//! | AGGREGATOR_WORKERS_COUNT | 5 | Ingest workers |
//! | AGGREGATOR_METRICS_BATCH_SIZE | 10 | Outcomes per metrics report |
//! | AGGREGATOR_FAILURE_REPORT_GATE | success_count | success_count or failure_count |
//! | AGGREGATOR_POINT_TTL_SECS | 500 | Point index expiry |
//! | AGGREGATOR_ORDER_INDEX_KEY | events | Order index key |
//! | AGGREGATOR_GENERATOR_INTERVAL_MS | 555 | Delay between packs |
//! | AGGREGATOR_GENERATOR_PACK_LENGTH | 10 | Values per pack |
//! | AGGREGATOR_GENERATOR_COUNT | 100 | Packs to generate |
//! | AGGREGATOR_LOG_LEVEL | info | Filter directive (RUST_LOG wins) |
//! | AGGREGATOR_LOG_FORMAT | text | text or json |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use pack_aggregator::generator::BatchGenerator;
use pack_aggregator::observability::init_tracing;
use pack_aggregator::{
    AggregatorConfig, DualIndexStore, InMemoryBackend, IngestPipeline, QueryService, RecordStore,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AggregatorConfig::load()?;
    init_tracing(&config.logging)?;
    info!(?config, "starting pack aggregator");

    let backend = InMemoryBackend::new().with_sweep_interval(config.expiry_sweep_interval);
    let store = DualIndexStore::new(backend)
        .with_point_ttl(config.point_ttl)
        .with_order_key(config.order_index_key.clone());
    let service = Arc::new(QueryService::new(store));
    if let Err(e) = service.open().await {
        service.close().await;
        return Err(e.into());
    }

    let result = run_ingest(service.clone(), &config).await;
    service.close().await;
    result
}

/// Everything between open and close; the caller closes the store on every path.
async fn run_ingest<S: RecordStore>(
    service: Arc<QueryService<S>>,
    config: &AggregatorConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let generator = BatchGenerator::from_config(&config.generator)?;
    let (input, running) = IngestPipeline::start(service.clone(), config);

    let (stop_tx, stop_rx) = watch::channel(false);
    let producer = tokio::spawn(generator.run(
        input,
        config.generator.interval,
        Some(config.generator.count),
        stop_rx,
    ));

    tokio::select! {
        sent = producer => {
            info!(sent = sent?, "producer done");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping producer");
            let _ = stop_tx.send(true);
        }
    }

    let (report, totals) = running.finish().await?;
    info!(
        processed = report.processed(),
        succeeded = totals.succeeded,
        failed = totals.failed,
        "ingest drained"
    );

    match service.list_by_period(i64::MIN, i64::MAX).await {
        Ok(records) => {
            let first = records.first().map(|r| r.timestamp);
            let last = records.last().map(|r| r.timestamp);
            info!(count = records.len(), ?first, ?last, "stored records");
        }
        Err(e) => warn!(error = %e, "range query returned no records"),
    }

    Ok(())
}
