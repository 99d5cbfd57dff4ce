use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One counter of the metrics aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    Total,
    Success,
    Failure,
    Timeout,
    Retry,
    RetrySuccess,
    Skip,
    TotalDurationMs,
}

impl Counter {
    pub const ALL: [Counter; 8] = [
        Counter::Total,
        Counter::Success,
        Counter::Failure,
        Counter::Timeout,
        Counter::Retry,
        Counter::RetrySuccess,
        Counter::Skip,
        Counter::TotalDurationMs,
    ];

    /// Column name in the persisted aggregate.
    pub fn column(self) -> &'static str {
        match self {
            Counter::Total => "total_count",
            Counter::Success => "success_count",
            Counter::Failure => "failure_count",
            Counter::Timeout => "timeout_count",
            Counter::Retry => "retry_count",
            Counter::RetrySuccess => "retry_success_count",
            Counter::Skip => "skip_count",
            Counter::TotalDurationMs => "total_duration_ms",
        }
    }
}

/// Increments to add to the aggregate in a single atomic write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsDelta(BTreeMap<Counter, u64>);

impl MetricsDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, counter: Counter, amount: u64) -> Self {
        if amount > 0 {
            *self.0.entry(counter).or_default() += amount;
        }
        self
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.0.get(&counter).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Counter, u64)> + '_ {
        self.0.iter().map(|(c, n)| (*c, *n))
    }

    /// A done job was requested again.
    pub fn skip() -> Self {
        Self::new().with(Counter::Total, 1).with(Counter::Skip, 1)
    }

    pub fn success(duration_ms: u64, after_retry: bool) -> Self {
        Self::new()
            .with(Counter::Total, 1)
            .with(Counter::Success, 1)
            .with(Counter::TotalDurationMs, duration_ms)
            .with(Counter::RetrySuccess, u64::from(after_retry))
    }

    pub fn failure(duration_ms: u64, timed_out: bool) -> Self {
        Self::new()
            .with(Counter::Total, 1)
            .with(Counter::Failure, 1)
            .with(Counter::TotalDurationMs, duration_ms)
            .with(Counter::Timeout, u64::from(timed_out))
    }

    /// An attempt timed out and will be retried.
    pub fn timeout_retry() -> Self {
        Self::new().with(Counter::Timeout, 1).with(Counter::Retry, 1)
    }
}

/// The singleton counters record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsAggregate {
    pub total_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub retry_count: u64,
    pub retry_success_count: u64,
    pub skip_count: u64,
    pub total_duration_ms: u64,
}

impl MetricsAggregate {
    /// Zero baseline plus `delta`; the row written when none exists yet.
    pub fn from_delta(delta: &MetricsDelta) -> Self {
        let mut aggregate = Self::default();
        aggregate.apply(delta);
        aggregate
    }

    pub fn apply(&mut self, delta: &MetricsDelta) {
        for (counter, amount) in delta.iter() {
            let slot = self.slot_mut(counter);
            *slot = slot.saturating_add(amount);
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Total => self.total_count,
            Counter::Success => self.success_count,
            Counter::Failure => self.failure_count,
            Counter::Timeout => self.timeout_count,
            Counter::Retry => self.retry_count,
            Counter::RetrySuccess => self.retry_success_count,
            Counter::Skip => self.skip_count,
            Counter::TotalDurationMs => self.total_duration_ms,
        }
    }

    fn slot_mut(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::Total => &mut self.total_count,
            Counter::Success => &mut self.success_count,
            Counter::Failure => &mut self.failure_count,
            Counter::Timeout => &mut self.timeout_count,
            Counter::Retry => &mut self.retry_count,
            Counter::RetrySuccess => &mut self.retry_success_count,
            Counter::Skip => &mut self.skip_count,
            Counter::TotalDurationMs => &mut self.total_duration_ms,
        }
    }

    /// `total == success + failure + skip`.
    pub fn is_consistent(&self) -> bool {
        self.total_count == self.success_count + self.failure_count + self.skip_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_deltas_keep_the_aggregate_consistent() {
        let mut agg = MetricsAggregate::default();
        for delta in [
            MetricsDelta::skip(),
            MetricsDelta::success(120, true),
            MetricsDelta::timeout_retry(),
            MetricsDelta::failure(30, true),
        ] {
            agg.apply(&delta);
            assert!(agg.is_consistent());
        }
        assert_eq!(agg.total_count, 3);
        assert_eq!(agg.timeout_count, 2);
        assert_eq!(agg.retry_success_count, 1);
        assert_eq!(agg.total_duration_ms, 150);
    }

    #[test]
    fn zero_amounts_are_not_recorded() {
        let delta = MetricsDelta::success(0, false);
        assert_eq!(delta.get(Counter::TotalDurationMs), 0);
        assert_eq!(delta.get(Counter::RetrySuccess), 0);
        assert_eq!(delta.iter().count(), 2);
        assert!(MetricsDelta::new().is_empty());
    }

    #[test]
    fn serializes_with_caller_facing_names() {
        let json = serde_json::to_value(MetricsAggregate::from_delta(&MetricsDelta::skip())).unwrap();
        assert_eq!(json["totalCount"], 1);
        assert_eq!(json["skipCount"], 1);
        assert_eq!(json["retrySuccessCount"], 0);
    }
}
