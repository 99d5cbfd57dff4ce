use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::{is_unique_violation, map_sqlx_error};
use crate::metrics::{Counter, MetricsAggregate, MetricsDelta, MetricsStore, MetricsStoreError};

/// Primary key of the singleton aggregate row.
pub const AGGREGATE_ID: &str = "global";

#[derive(Debug, Clone)]
pub struct PostgresMetricsStore {
    pool: Arc<PgPool>,
}

impl PostgresMetricsStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn storage(operation: &str, err: sqlx::Error) -> MetricsStoreError {
    MetricsStoreError::Storage(map_sqlx_error(operation, err).to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl MetricsStore for PostgresMetricsStore {
    #[instrument(skip_all)]
    async fn add_to_existing(&self, delta: &MetricsDelta) -> Result<(), MetricsStoreError> {
        let outcome = sqlx::query(
            r#"
            UPDATE analysis_metrics
            SET total_count = total_count + $2,
                success_count = success_count + $3,
                failure_count = failure_count + $4,
                timeout_count = timeout_count + $5,
                retry_count = retry_count + $6,
                retry_success_count = retry_success_count + $7,
                skip_count = skip_count + $8,
                total_duration_ms = total_duration_ms + $9,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(AGGREGATE_ID)
        .bind(to_i64(delta.get(Counter::Total)))
        .bind(to_i64(delta.get(Counter::Success)))
        .bind(to_i64(delta.get(Counter::Failure)))
        .bind(to_i64(delta.get(Counter::Timeout)))
        .bind(to_i64(delta.get(Counter::Retry)))
        .bind(to_i64(delta.get(Counter::RetrySuccess)))
        .bind(to_i64(delta.get(Counter::Skip)))
        .bind(to_i64(delta.get(Counter::TotalDurationMs)))
        .execute(&*self.pool)
        .await
        .map_err(|e| storage("add_metrics", e))?;

        if outcome.rows_affected() == 0 {
            return Err(MetricsStoreError::NotExist);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn create(&self, initial: &MetricsAggregate) -> Result<(), MetricsStoreError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_metrics (
                id, total_count, success_count, failure_count, timeout_count,
                retry_count, retry_success_count, skip_count, total_duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(AGGREGATE_ID)
        .bind(to_i64(initial.total_count))
        .bind(to_i64(initial.success_count))
        .bind(to_i64(initial.failure_count))
        .bind(to_i64(initial.timeout_count))
        .bind(to_i64(initial.retry_count))
        .bind(to_i64(initial.retry_success_count))
        .bind(to_i64(initial.skip_count))
        .bind(to_i64(initial.total_duration_ms))
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MetricsStoreError::DuplicateKey
            } else {
                storage("create_metrics", e)
            }
        })?;

        Ok(())
    }

    async fn load(&self) -> Result<Option<MetricsAggregate>, MetricsStoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                total_count, success_count, failure_count, timeout_count,
                retry_count, retry_success_count, skip_count, total_duration_ms
            FROM analysis_metrics
            WHERE id = $1
            "#,
        )
        .bind(AGGREGATE_ID)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage("load_metrics", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut delta = MetricsDelta::new();
        for counter in Counter::ALL {
            let value: i64 = row.try_get(counter.column()).map_err(|e| {
                MetricsStoreError::Storage(format!("failed to read {}: {e}", counter.column()))
            })?;
            delta = delta.with(counter, u64::try_from(value).unwrap_or(0));
        }
        Ok(Some(MetricsAggregate::from_delta(&delta)))
    }
}
