//! Lossless, lock-free increments of the shared metrics aggregate.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::store::{MetricsStore, MetricsStoreError};
use super::types::{MetricsAggregate, MetricsDelta};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Applies deltas with the update → create → retry-update protocol.
///
/// - `add_to_existing` succeeds in the common case.
/// - The first writer ever creates the aggregate with its delta as the baseline.
/// - A writer that loses the creation race sees `DuplicateKey` and retries the add,
///   which now finds the row. Two rounds always suffice; the cap only guards
///   against a misbehaving store.
pub struct MetricsAggregator<M> {
    store: Arc<M>,
    invariant_check: bool,
    max_attempts: u32,
}

impl<M> Clone for MetricsAggregator<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            invariant_check: self.invariant_check,
            max_attempts: self.max_attempts,
        }
    }
}

impl<M: MetricsStore> MetricsAggregator<M> {
    pub fn new(store: Arc<M>) -> Self {
        Self {
            store,
            invariant_check: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_invariant_check(mut self, enabled: bool) -> Self {
        self.invariant_check = enabled;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<M> {
        &self.store
    }

    /// Fire-and-forget: applies `delta` on a detached task. Errors are logged.
    ///
    /// Must be called from within a tokio runtime.
    pub fn increment(&self, delta: MetricsDelta) {
        if delta.is_empty() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.apply(&delta).await {
                error!(error = %e, ?delta, "metrics increment dropped");
            }
        });
    }

    /// Awaitable form of [`increment`](Self::increment).
    pub async fn apply(&self, delta: &MetricsDelta) -> Result<(), MetricsStoreError> {
        if delta.is_empty() {
            return Ok(());
        }

        for attempt in 1..=self.max_attempts {
            match self.store.add_to_existing(delta).await {
                Ok(()) => {
                    self.check_invariant().await;
                    return Ok(());
                }
                Err(MetricsStoreError::NotExist) => {}
                Err(e) => return Err(e),
            }

            match self.store.create(&MetricsAggregate::from_delta(delta)).await {
                Ok(()) => {
                    debug!("metrics aggregate created");
                    self.check_invariant().await;
                    return Ok(());
                }
                Err(MetricsStoreError::DuplicateKey) => {
                    debug!(attempt, "lost metrics creation race, retrying add");
                }
                Err(e) => return Err(e),
            }
        }

        Err(MetricsStoreError::Exhausted(self.max_attempts))
    }

    /// Current counters; zeros when nothing was recorded yet.
    pub async fn snapshot(&self) -> Result<MetricsAggregate, MetricsStoreError> {
        Ok(self.store.load().await?.unwrap_or_default())
    }

    async fn check_invariant(&self) {
        if !self.invariant_check {
            return;
        }
        match self.store.load().await {
            Ok(Some(agg)) if !agg.is_consistent() => warn!(
                total = agg.total_count,
                success = agg.success_count,
                failure = agg.failure_count,
                skip = agg.skip_count,
                "metrics invariant violated: total != success + failure + skip"
            ),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "metrics invariant check could not read aggregate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetricsStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Barrier;

    /// Holds every writer that found no aggregate until all of them did, so they
    /// race on `create` together.
    struct RacingStore {
        inner: InMemoryMetricsStore,
        barrier: Barrier,
        duplicates: AtomicU32,
    }

    #[async_trait]
    impl MetricsStore for RacingStore {
        async fn add_to_existing(&self, delta: &MetricsDelta) -> Result<(), MetricsStoreError> {
            let result = self.inner.add_to_existing(delta).await;
            if result == Err(MetricsStoreError::NotExist) {
                self.barrier.wait().await;
            }
            result
        }

        async fn create(&self, initial: &MetricsAggregate) -> Result<(), MetricsStoreError> {
            let result = self.inner.create(initial).await;
            if result == Err(MetricsStoreError::DuplicateKey) {
                self.duplicates.fetch_add(1, Ordering::SeqCst);
            }
            result
        }

        async fn load(&self) -> Result<Option<MetricsAggregate>, MetricsStoreError> {
            self.inner.load().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_increments_are_lossless() {
        const C: usize = 8;
        let store = Arc::new(RacingStore {
            inner: InMemoryMetricsStore::new(),
            barrier: Barrier::new(C),
            duplicates: AtomicU32::new(0),
        });
        let aggregator = MetricsAggregator::new(Arc::clone(&store)).with_invariant_check(true);

        let tasks: Vec<_> = (0..C)
            .map(|_| {
                let aggregator = aggregator.clone();
                tokio::spawn(async move { aggregator.apply(&MetricsDelta::skip()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let agg = aggregator.snapshot().await.unwrap();
        assert_eq!(agg.total_count, C as u64);
        assert_eq!(agg.skip_count, C as u64);
        assert_eq!(store.duplicates.load(Ordering::SeqCst), (C - 1) as u32);
    }

    #[tokio::test]
    async fn snapshot_is_zero_before_first_write() {
        let aggregator = MetricsAggregator::new(Arc::new(InMemoryMetricsStore::new()));
        assert_eq!(aggregator.snapshot().await.unwrap(), MetricsAggregate::default());
    }

    struct AlwaysDuplicate;

    #[async_trait]
    impl MetricsStore for AlwaysDuplicate {
        async fn add_to_existing(&self, _delta: &MetricsDelta) -> Result<(), MetricsStoreError> {
            Err(MetricsStoreError::NotExist)
        }

        async fn create(&self, _initial: &MetricsAggregate) -> Result<(), MetricsStoreError> {
            Err(MetricsStoreError::DuplicateKey)
        }

        async fn load(&self) -> Result<Option<MetricsAggregate>, MetricsStoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn misbehaving_store_is_bounded() {
        let aggregator = MetricsAggregator::new(Arc::new(AlwaysDuplicate)).with_max_attempts(2);
        assert_eq!(
            aggregator.apply(&MetricsDelta::skip()).await,
            Err(MetricsStoreError::Exhausted(2))
        );
    }

    #[tokio::test]
    async fn fire_and_forget_increment_lands() {
        let aggregator = MetricsAggregator::new(Arc::new(InMemoryMetricsStore::new()));
        aggregator.increment(MetricsDelta::success(5, false));

        for _ in 0..100 {
            if aggregator.snapshot().await.unwrap().success_count == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("increment never landed");
    }
}
