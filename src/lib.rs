pub mod config;
pub mod dst;
pub mod generator;
pub mod keyspace;
pub mod metrics;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod service;
pub mod simulator;
pub mod storage;

pub use config::{AggregatorConfig, ConfigError};
pub use metrics::{FailureReportGate, MetricsSink, ProcessingTotals};
pub use model::{reduce, Batch, Record, ReduceError};
pub use pipeline::{IngestPipeline, PipelineReport, RunningIngest};
pub use service::{QueryService, ServiceError};
pub use storage::{DualIndexStore, InMemoryBackend, IndexBackend, RecordStore, StorageError};
