//! Infrastructure layer: job storage, metrics, orchestration, config.

pub mod analysis;
pub mod config;
pub mod metrics;
pub mod postgres;


pub use analysis::{
    AnalysisJob, AnalysisOrchestrator, AnalysisOutcome, AnalysisResponse, FailureReason,
    InMemoryJobStore, JobPatch, JobStore, StoreError,
};
pub use config::{AnalysisConfig, ConfigError};
pub use metrics::{
    InMemoryMetricsStore, MetricsAggregate, MetricsAggregator, MetricsDelta, MetricsStore,
    MetricsStoreError,
};
pub use postgres::{PostgresJobStore, PostgresMetricsStore};
