//! Job storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use sprout_core::{ExpectedStatus, RecordId};

use super::types::{AnalysisJob, JobPatch};

/// The two record operations the orchestrator relies on.
///
/// `conditional_update` must evaluate the status guard and apply the patch as
/// one atomic step. It reports how many records matched (0 or 1); a zero is
/// not an error.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn get(&self, id: RecordId) -> Result<Option<AnalysisJob>, StoreError>;

    async fn conditional_update(
        &self,
        id: RecordId,
        expected: ExpectedStatus,
        patch: JobPatch,
    ) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    AlreadyExists(RecordId),
    #[error("stored record is malformed: {0}")]
    Corrupt(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<RecordId, AnalysisJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed a record. Record creation belongs to another flow; this is its stand-in.
    pub fn insert(&self, job: AnalysisJob) -> Result<RecordId, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("job store lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: RecordId) -> Result<Option<AnalysisJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&id).cloned())
    }

    async fn conditional_update(
        &self,
        id: RecordId,
        expected: ExpectedStatus,
        patch: JobPatch,
    ) -> Result<u64, StoreError> {
        // Guard check and write happen under one write lock.
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        match jobs.get_mut(&id) {
            Some(job) if expected.permits(job.status, patch.status) => {
                job.apply(&patch, Utc::now());
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprout_ai::{AnalysisOutput, AnalysisSource, ConfidenceLevel};
    use sprout_core::{AnalysisStatus, BehaviorCategory, ChildId, Observation};

    fn job() -> AnalysisJob {
        let obs = Observation::new("stacked blocks", BehaviorCategory::Cognitive, 20).unwrap();
        AnalysisJob::pending(RecordId::new(), ChildId::new(), obs)
    }

    fn output() -> AnalysisOutput {
        AnalysisOutput::new("ok", ConfidenceLevel::Low, AnalysisSource::RuleBased)
    }

    #[tokio::test]
    async fn guarded_update_matches_only_expected_status() {
        let store = InMemoryJobStore::new();
        let id = store.insert(job()).unwrap();

        let done = JobPatch::done(output());
        assert_eq!(
            store
                .conditional_update(id, ExpectedStatus::Exactly(AnalysisStatus::Analyzing), done.clone())
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .conditional_update(id, ExpectedStatus::NotTerminal, JobPatch::analyzing())
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .conditional_update(id, ExpectedStatus::Exactly(AnalysisStatus::Analyzing), done)
                .await
                .unwrap(),
            1
        );

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Done);
        assert_eq!(stored.result, Some(output()));
    }

    #[tokio::test]
    async fn illegal_transition_matches_nothing() {
        let store = InMemoryJobStore::new();
        let id = store.insert(job()).unwrap();

        let matched = store
            .conditional_update(id, ExpectedStatus::Exactly(AnalysisStatus::Pending), JobPatch::done(output()))
            .await
            .unwrap();
        assert_eq!(matched, 0);
        assert_eq!(store.get(id).await.unwrap().unwrap().status, AnalysisStatus::Pending);
    }

    #[tokio::test]
    async fn terminal_records_cannot_be_remarked() {
        let store = InMemoryJobStore::new();
        let id = store.insert(job().with_status(AnalysisStatus::Failed)).unwrap();

        let matched = store
            .conditional_update(id, ExpectedStatus::NotTerminal, JobPatch::analyzing())
            .await
            .unwrap();
        assert_eq!(matched, 0);
        assert_eq!(store.get(id).await.unwrap().unwrap().status, AnalysisStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_ids_match_nothing() {
        let store = InMemoryJobStore::new();
        let id = RecordId::new();
        assert!(store.get(id).await.unwrap().is_none());
        assert_eq!(
            store
                .conditional_update(id, ExpectedStatus::NotTerminal, JobPatch::analyzing())
                .await
                .unwrap(),
            0
        );
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = job();
        store.insert(job.clone()).unwrap();
        assert_eq!(store.insert(job.clone()), Err(StoreError::AlreadyExists(job.id)));
        assert_eq!(store.len(), 1);
    }
}
