use async_trait::async_trait;

use sprout_core::Observation;

use crate::result::{AnalysisOutput, AnalyzerError, Enrichment};

/// One way of interpreting an observation.
///
/// Strategies are stateless with respect to records: they read the observation
/// and return an interpretation, nothing else. Storage is handled by callers.
#[async_trait]
pub trait AnalyzerStrategy: Send + Sync + 'static {
    /// Stable name used in logs and chain reports.
    fn name(&self) -> &str;

    /// Higher runs first inside an [`AnalyzerChain`](crate::AnalyzerChain).
    fn priority(&self) -> u32;

    /// Cheap precondition check (e.g. required configuration present).
    ///
    /// Must not perform IO.
    fn is_available(&self) -> bool {
        true
    }

    async fn analyze(&self, observation: &Observation) -> Result<AnalysisOutput, AnalyzerError>;
}

/// Secondary strategy that adds richer optional fields on top of a baseline.
#[async_trait]
pub trait EnrichmentStrategy: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }

    async fn enrich(
        &self,
        observation: &Observation,
        baseline: &AnalysisOutput,
    ) -> Result<Enrichment, AnalyzerError>;
}
