use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::types::{MetricsAggregate, MetricsDelta};

/// Storage primitives for the singleton metrics aggregate.
///
/// Both writes must be atomic on their own. Composing them into a lossless
/// increment is the job of [`MetricsAggregator`](super::MetricsAggregator).
#[async_trait]
pub trait MetricsStore: Send + Sync + 'static {
    /// Add `delta` to the existing aggregate. [`MetricsStoreError::NotExist`] when there is none.
    async fn add_to_existing(&self, delta: &MetricsDelta) -> Result<(), MetricsStoreError>;

    /// Create the aggregate. [`MetricsStoreError::DuplicateKey`] when it already exists.
    async fn create(&self, initial: &MetricsAggregate) -> Result<(), MetricsStoreError>;

    async fn load(&self) -> Result<Option<MetricsAggregate>, MetricsStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsStoreError {
    #[error("metrics aggregate does not exist")]
    NotExist,
    #[error("metrics aggregate already exists")]
    DuplicateKey,
    #[error("metrics increment gave up after {0} attempts")]
    Exhausted(u32),
    #[error("metrics storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    aggregate: RwLock<Option<MetricsAggregate>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> MetricsStoreError {
    MetricsStoreError::Storage("metrics lock poisoned".to_string())
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn add_to_existing(&self, delta: &MetricsDelta) -> Result<(), MetricsStoreError> {
        let mut guard = self.aggregate.write().map_err(|_| poisoned())?;
        match guard.as_mut() {
            Some(aggregate) => {
                aggregate.apply(delta);
                Ok(())
            }
            None => Err(MetricsStoreError::NotExist),
        }
    }

    async fn create(&self, initial: &MetricsAggregate) -> Result<(), MetricsStoreError> {
        let mut guard = self.aggregate.write().map_err(|_| poisoned())?;
        if guard.is_some() {
            return Err(MetricsStoreError::DuplicateKey);
        }
        *guard = Some(*initial);
        Ok(())
    }

    async fn load(&self) -> Result<Option<MetricsAggregate>, MetricsStoreError> {
        let guard = self.aggregate.read().map_err(|_| poisoned())?;
        Ok(*guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn primitives_report_missing_and_duplicate() {
        let store = InMemoryMetricsStore::new();
        let delta = MetricsDelta::skip();

        assert_eq!(store.add_to_existing(&delta).await, Err(MetricsStoreError::NotExist));
        store.create(&MetricsAggregate::from_delta(&delta)).await.unwrap();
        assert_eq!(
            store.create(&MetricsAggregate::default()).await,
            Err(MetricsStoreError::DuplicateKey)
        );
        store.add_to_existing(&delta).await.unwrap();

        let agg = store.load().await.unwrap().unwrap();
        assert_eq!(agg.total_count, 2);
        assert_eq!(agg.skip_count, 2);
    }
}
