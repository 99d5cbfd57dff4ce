//! Persisted analysis job and the outcomes the orchestrator reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sprout_ai::AnalysisOutput;
use sprout_core::{AnalysisStatus, ChildId, Observation, RecordId};

/// The analysis-relevant slice of a behavior record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: RecordId,
    pub child_id: ChildId,
    pub observation: Observation,
    pub status: AnalysisStatus,
    pub retry_count: u32,
    /// Present only when `status` is `done`.
    pub result: Option<AnalysisOutput>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// A freshly created record, waiting for analysis.
    pub fn pending(id: RecordId, child_id: ChildId, observation: Observation) -> Self {
        let now = Utc::now();
        Self {
            id,
            child_id,
            observation,
            status: AnalysisStatus::Pending,
            retry_count: 0,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: AnalysisStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_result(mut self, result: AnalysisOutput) -> Self {
        self.status = AnalysisStatus::Done;
        self.result = Some(result);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Apply a patch in place. Callers have already checked the guard with
    /// [`ExpectedStatus::permits`](sprout_core::ExpectedStatus::permits).
    pub fn apply(&mut self, patch: &JobPatch, now: DateTime<Utc>) {
        self.status = patch.status;
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(result) = &patch.result {
            self.result = Some(result.clone());
        }
        self.updated_at = now;
    }
}

/// Fields a conditional write sets. `updated_at` is always refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPatch {
    pub status: AnalysisStatus,
    pub retry_count: Option<u32>,
    pub result: Option<AnalysisOutput>,
}

impl JobPatch {
    pub fn analyzing() -> Self {
        Self {
            status: AnalysisStatus::Analyzing,
            retry_count: None,
            result: None,
        }
    }

    pub fn retry(retry_count: u32) -> Self {
        Self {
            status: AnalysisStatus::Analyzing,
            retry_count: Some(retry_count),
            result: None,
        }
    }

    pub fn done(result: AnalysisOutput) -> Self {
        Self {
            status: AnalysisStatus::Done,
            retry_count: None,
            result: Some(result),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: AnalysisStatus::Failed,
            retry_count: None,
            result: None,
        }
    }
}

/// Why an invocation could not return an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The job was already terminally failed before this invocation.
    AlreadyFailed,
    /// The analyzer task died without producing a result.
    Analyzer(String),
    /// A store operation failed where a result was required.
    Store(String),
}

/// Result of one `run_analysis` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// This invocation ran the chain and won the commit.
    Analyzed {
        output: AnalysisOutput,
        after_retry: bool,
    },
    /// The job was already done; the stored result is returned.
    Cached(AnalysisOutput),
    NotFound,
    /// Another invocation transitioned the job first.
    Stale,
    /// Every attempt timed out and this invocation marked the job failed.
    TimedOut,
    Failed(FailureReason),
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Analyzed { .. } | Self::Cached(_))
    }

    pub fn output(&self) -> Option<&AnalysisOutput> {
        match self {
            Self::Analyzed { output, .. } | Self::Cached(output) => Some(output),
            _ => None,
        }
    }

    /// Stable caller-facing error marker.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Analyzed { .. } | Self::Cached(_) => None,
            Self::NotFound => Some("not_found"),
            Self::Stale => Some("stale_write"),
            Self::TimedOut => Some("timeout"),
            Self::Failed(FailureReason::AlreadyFailed) | Self::Failed(FailureReason::Analyzer(_)) => {
                Some("analysis_failed")
            }
            Self::Failed(FailureReason::Store(_)) => Some("store_error"),
        }
    }

    pub fn into_response(self) -> AnalysisResponse {
        let error = self.error_code().map(str::to_string);
        match self {
            Self::Analyzed { output, .. } | Self::Cached(output) => AnalysisResponse {
                success: true,
                data: Some(output),
                error: None,
            },
            _ => AnalysisResponse {
                success: false,
                data: None,
                error,
            },
        }
    }
}

/// Caller-facing result shape: `{success, data?, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<AnalysisOutcome> for AnalysisResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        outcome.into_response()
    }
}
