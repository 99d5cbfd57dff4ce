//! Store and orchestrator wiring.
//!
//! With `DATABASE_URL` set the API runs against Postgres; otherwise everything
//! lives in memory (development and black-box tests).

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use sprout_ai::AnalyzerChain;
use sprout_core::RecordId;
use sprout_infra::{
    postgres, AnalysisConfig, AnalysisJob, AnalysisOrchestrator, AnalysisOutcome,
    InMemoryJobStore, InMemoryMetricsStore, MetricsAggregate, MetricsStoreError,
    PostgresJobStore, PostgresMetricsStore, StoreError,
};

use crate::config::ApiConfig;

pub type InMemoryOrchestrator = AnalysisOrchestrator<InMemoryJobStore, InMemoryMetricsStore>;
pub type PersistentOrchestrator = AnalysisOrchestrator<PostgresJobStore, PostgresMetricsStore>;

pub enum AppServices {
    InMemory {
        orchestrator: InMemoryOrchestrator,
    },
    Persistent {
        orchestrator: PersistentOrchestrator,
    },
}

impl AppServices {
    pub fn in_memory(chain: AnalyzerChain, config: AnalysisConfig) -> Self {
        let orchestrator = AnalysisOrchestrator::new(
            InMemoryJobStore::arc(),
            chain,
            InMemoryMetricsStore::arc(),
            config,
        );
        Self::InMemory { orchestrator }
    }

    /// Connect, ensure the schema exists, and wire the Postgres stores.
    pub async fn persistent(
        database_url: &str,
        chain: AnalyzerChain,
        config: AnalysisConfig,
    ) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        postgres::ensure_schema(&pool)
            .await
            .context("failed to prepare database schema")?;

        let orchestrator = AnalysisOrchestrator::new(
            Arc::new(PostgresJobStore::new(pool.clone())),
            chain,
            Arc::new(PostgresMetricsStore::new(pool)),
            config,
        );
        Ok(Self::Persistent { orchestrator })
    }

    pub async fn build(config: &ApiConfig) -> anyhow::Result<Self> {
        let chain = AnalyzerChain::standard(config.enrichment.clone());
        info!(strategies = ?chain.strategy_names(), "analyzer chain ready");

        match config.database_url.as_deref() {
            Some(url) => {
                info!("using persistent stores");
                Self::persistent(url, chain, config.analysis.clone()).await
            }
            None => {
                info!("DATABASE_URL not set, using in-memory stores");
                Ok(Self::in_memory(chain, config.analysis.clone()))
            }
        }
    }

    pub async fn run_analysis(&self, id: RecordId) -> AnalysisOutcome {
        match self {
            Self::InMemory { orchestrator } => orchestrator.run_analysis(id).await,
            Self::Persistent { orchestrator } => orchestrator.run_analysis(id).await,
        }
    }

    pub async fn metrics_snapshot(&self) -> Result<MetricsAggregate, MetricsStoreError> {
        match self {
            Self::InMemory { orchestrator } => orchestrator.metrics().snapshot().await,
            Self::Persistent { orchestrator } => orchestrator.metrics().snapshot().await,
        }
    }

    /// Store a record so it can be analyzed. Record creation proper is owned
    /// by another service; this is for seeding.
    pub async fn seed(&self, job: AnalysisJob) -> Result<RecordId, StoreError> {
        match self {
            Self::InMemory { orchestrator } => orchestrator.jobs().insert(job),
            Self::Persistent { orchestrator } => {
                orchestrator.jobs().insert(&job).await?;
                Ok(job.id)
            }
        }
    }
}
