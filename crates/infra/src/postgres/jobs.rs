use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use sprout_ai::AnalysisOutput;
use sprout_core::{
    AnalysisStatus, BehaviorCategory, ChildId, DomainError, ExpectedStatus, Observation, RecordId,
};

use super::{is_unique_violation, map_sqlx_error};
use crate::analysis::{AnalysisJob, JobPatch, JobStore, StoreError};

/// Analysis jobs stored as columns of `behavior_records`.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert a record. Used by seeding and tests; record creation proper lives elsewhere.
    #[instrument(skip_all, fields(record_id = %job.id), err)]
    pub async fn insert(&self, job: &AnalysisJob) -> Result<(), StoreError> {
        let age_months = to_i32("age_months", job.observation.age_months)?;
        let retry_count = to_i32("retry_count", job.retry_count)?;
        let result = job
            .result
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("failed to encode result: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO behavior_records (
                id, child_id, behavior, category, age_months, context,
                analysis_status, retry_count, analysis_result, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.child_id.as_uuid())
        .bind(&job.observation.behavior)
        .bind(job.observation.category.as_str())
        .bind(age_months)
        .bind(job.observation.context.as_deref())
        .bind(job.status.as_str())
        .bind(retry_count)
        .bind(result)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("insert_record", e)
            }
        })?;

        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self), fields(record_id = %id), err)]
    async fn get(&self, id: RecordId) -> Result<Option<AnalysisJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                child_id,
                behavior,
                category,
                age_months,
                context,
                analysis_status,
                retry_count,
                analysis_result,
                created_at,
                updated_at
            FROM behavior_records
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_record", e))?;

        row.map(|row| JobRow::from_row(&row).and_then(AnalysisJob::try_from))
            .transpose()
    }

    #[instrument(skip(self, patch), fields(record_id = %id, status = %patch.status), err)]
    async fn conditional_update(
        &self,
        id: RecordId,
        expected: ExpectedStatus,
        patch: JobPatch,
    ) -> Result<u64, StoreError> {
        let allowed: Vec<&str> = expected
            .allowed()
            .iter()
            .filter(|s| s.can_transition_to(patch.status))
            .map(|s| s.as_str())
            .collect();
        let result = patch
            .result
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("failed to encode result: {e}")))?;

        let retry_count = patch
            .retry_count
            .map(|n| to_i32("retry_count", n))
            .transpose()?;

        let outcome = sqlx::query(
            r#"
            UPDATE behavior_records
            SET analysis_status = $3,
                retry_count = COALESCE($4, retry_count),
                analysis_result = COALESCE($5, analysis_result),
                updated_at = NOW()
            WHERE id = $1 AND analysis_status = ANY($2)
            "#,
        )
        .bind(id.as_uuid())
        .bind(allowed)
        .bind(patch.status.as_str())
        .bind(retry_count)
        .bind(result)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("conditional_update", e))?;

        Ok(outcome.rows_affected())
    }
}

/// Columns are `INTEGER`; refuse values that would wrap.
fn to_i32(column: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

struct JobRow {
    id: uuid::Uuid,
    child_id: uuid::Uuid,
    behavior: String,
    category: String,
    age_months: i32,
    context: Option<String>,
    analysis_status: String,
    retry_count: i32,
    analysis_result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, StoreError> {
        let read = |e: sqlx::Error| StoreError::Corrupt(format!("failed to read record row: {e}"));
        Ok(Self {
            id: row.try_get("id").map_err(read)?,
            child_id: row.try_get("child_id").map_err(read)?,
            behavior: row.try_get("behavior").map_err(read)?,
            category: row.try_get("category").map_err(read)?,
            age_months: row.try_get("age_months").map_err(read)?,
            context: row.try_get("context").map_err(read)?,
            analysis_status: row.try_get("analysis_status").map_err(read)?,
            retry_count: row.try_get("retry_count").map_err(read)?,
            analysis_result: row.try_get("analysis_result").map_err(read)?,
            created_at: row.try_get("created_at").map_err(read)?,
            updated_at: row.try_get("updated_at").map_err(read)?,
        })
    }
}

impl TryFrom<JobRow> for AnalysisJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, detail: String| StoreError::Corrupt(format!("{what}: {detail}"));

        let category: BehaviorCategory = row
            .category
            .parse()
            .map_err(|e: DomainError| corrupt("category", e.to_string()))?;
        let status: AnalysisStatus = row
            .analysis_status
            .parse()
            .map_err(|e: DomainError| corrupt("analysis_status", e.to_string()))?;
        let age_months = u32::try_from(row.age_months)
            .map_err(|_| corrupt("age_months", row.age_months.to_string()))?;
        let retry_count = u32::try_from(row.retry_count)
            .map_err(|_| corrupt("retry_count", row.retry_count.to_string()))?;
        let result = row
            .analysis_result
            .map(serde_json::from_value::<AnalysisOutput>)
            .transpose()
            .map_err(|e| corrupt("analysis_result", e.to_string()))?;

        Ok(AnalysisJob {
            id: RecordId::from_uuid(row.id),
            child_id: ChildId::from_uuid(row.child_id),
            observation: Observation {
                behavior: row.behavior,
                category,
                age_months,
                context: row.context,
            },
            status,
            retry_count,
            result,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_columns_reject_values_that_would_wrap() {
        assert_eq!(to_i32("retry_count", 3), Ok(3));
        assert_eq!(to_i32("age_months", i32::MAX as u32), Ok(i32::MAX));

        let err = to_i32("age_months", u32::MAX).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(ref msg) if msg.contains("age_months")));
    }
}
