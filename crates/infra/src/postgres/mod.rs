//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | Mapped to | Scenario |
//! |------------|----------------------|-----------|----------|
//! | Database (unique violation) | `23505` | `MetricsStoreError::DuplicateKey` | Concurrent first creation of the metrics row |
//! | Database (other) | Any other | `Storage` | Constraint or query errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |
//!
//! Conditional writes use `UPDATE ... WHERE id = $1 AND analysis_status = ANY($2)`;
//! Postgres evaluates the predicate and the write under one row lock, and
//! `rows_affected()` is the matched count.

pub mod jobs;
pub mod metrics;

pub use jobs::PostgresJobStore;
pub use metrics::PostgresMetricsStore;

use sqlx::PgPool;
use tracing::info;

use crate::analysis::StoreError;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS behavior_records (
        id UUID PRIMARY KEY,
        child_id UUID NOT NULL,
        behavior TEXT NOT NULL,
        category TEXT NOT NULL,
        age_months INTEGER NOT NULL CHECK (age_months >= 0),
        context TEXT,
        analysis_status TEXT NOT NULL DEFAULT 'pending'
            CHECK (analysis_status IN ('pending', 'analyzing', 'done', 'failed')),
        retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
        analysis_result JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS behavior_records_child_idx
        ON behavior_records (child_id, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS analysis_metrics (
        id TEXT PRIMARY KEY,
        total_count BIGINT NOT NULL DEFAULT 0,
        success_count BIGINT NOT NULL DEFAULT 0,
        failure_count BIGINT NOT NULL DEFAULT 0,
        timeout_count BIGINT NOT NULL DEFAULT 0,
        retry_count BIGINT NOT NULL DEFAULT 0,
        retry_success_count BIGINT NOT NULL DEFAULT 0,
        skip_count BIGINT NOT NULL DEFAULT 0,
        total_duration_ms BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Create tables if missing. Idempotent; safe to run on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    info!("database schema ready");
    Ok(())
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Storage(format!(
            "database error in {}: {} (code {})",
            operation,
            db_err.message(),
            db_err.code().as_deref().unwrap_or("none")
        )),
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Storage(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
