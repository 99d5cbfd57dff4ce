//! Durable analysis counters.
//!
//! A single aggregate record holds every counter. Writers never read-modify-write
//! it; they send deltas that the store adds atomically.

pub mod aggregator;
pub mod store;
pub mod types;

pub use aggregator::MetricsAggregator;
pub use store::{InMemoryMetricsStore, MetricsStore, MetricsStoreError};
pub use types::{Counter, MetricsAggregate, MetricsDelta};
