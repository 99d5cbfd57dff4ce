use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use sprout_core::Observation;

use crate::result::{AnalysisOutput, AnalysisSource, AnalyzerError};
use crate::rules::RuleBasedAnalyzer;
use crate::strategy::{AnalyzerStrategy, EnrichmentStrategy};

/// Rule baseline first, then an optional enrichment overlay.
///
/// The baseline comes from [`RuleBasedAnalyzer::evaluate`], which accepts any
/// observation, so this strategy always returns `Ok`. Enrichment failures are
/// logged and degrade the result to [`AnalysisSource::BaselineOnly`].
pub struct BaselineEnrichedAnalyzer {
    baseline: RuleBasedAnalyzer,
    enricher: Arc<dyn EnrichmentStrategy>,
    priority: u32,
}

impl BaselineEnrichedAnalyzer {
    pub fn new(enricher: Arc<dyn EnrichmentStrategy>) -> Self {
        Self {
            baseline: RuleBasedAnalyzer::new(),
            enricher,
            priority: 100,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_baseline(mut self, baseline: RuleBasedAnalyzer) -> Self {
        self.baseline = baseline;
        self
    }
}

#[async_trait]
impl AnalyzerStrategy for BaselineEnrichedAnalyzer {
    fn name(&self) -> &str {
        "baseline_enriched"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn analyze(&self, observation: &Observation) -> Result<AnalysisOutput, AnalyzerError> {
        let baseline = self.baseline.evaluate(observation);

        if !self.enricher.is_available() {
            debug!(enricher = self.enricher.name(), "enricher unavailable, using baseline only");
            return Ok(baseline.with_source(AnalysisSource::BaselineOnly));
        }

        match self.enricher.enrich(observation, &baseline).await {
            Ok(enrichment) if !enrichment.is_empty() => Ok(enrichment.overlay(baseline)),
            Ok(_) => {
                warn!(enricher = self.enricher.name(), "enricher returned no usable fields");
                Ok(baseline.with_source(AnalysisSource::BaselineOnly))
            }
            Err(e) => {
                warn!(enricher = self.enricher.name(), error = %e, "enrichment failed");
                Ok(baseline.with_source(AnalysisSource::BaselineOnly))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Enrichment;
    use sprout_core::BehaviorCategory;

    struct Fixed(Result<Enrichment, AnalyzerError>, bool);

    #[async_trait]
    impl EnrichmentStrategy for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_available(&self) -> bool {
            self.1
        }

        async fn enrich(
            &self,
            _observation: &Observation,
            _baseline: &AnalysisOutput,
        ) -> Result<Enrichment, AnalyzerError> {
            self.0.clone()
        }
    }

    fn walking() -> Observation {
        Observation::new("走了5步", BehaviorCategory::Motor, 14).unwrap()
    }

    #[tokio::test]
    async fn overlays_enrichment_on_the_rule_baseline() {
        let enricher = Fixed(
            Ok(Enrichment {
                psychological_reading: Some("a richer reading".into()),
                ..Default::default()
            }),
            true,
        );
        let out = BaselineEnrichedAnalyzer::new(Arc::new(enricher))
            .analyze(&walking())
            .await
            .unwrap();

        assert_eq!(out.source, AnalysisSource::Enriched);
        assert_eq!(out.psychological_reading.as_deref(), Some("a richer reading"));
        assert_eq!(
            out.milestone.map(|m| m.label).as_deref(),
            Some("Independent walking")
        );
    }

    #[tokio::test]
    async fn enrichment_failure_degrades_to_baseline() {
        let enricher = Fixed(Err(AnalyzerError::InferenceFailed("boom".into())), true);
        let out = BaselineEnrichedAnalyzer::new(Arc::new(enricher))
            .analyze(&walking())
            .await
            .unwrap();

        let baseline = RuleBasedAnalyzer::new().evaluate(&walking());
        assert_eq!(out.source, AnalysisSource::BaselineOnly);
        assert_eq!(out.interpretation, baseline.interpretation);
    }

    #[tokio::test]
    async fn empty_or_unavailable_enrichment_is_baseline_only() {
        let empty = Fixed(Ok(Enrichment::default()), true);
        let off = Fixed(Ok(Enrichment::default()), false);

        for enricher in [empty, off] {
            let out = BaselineEnrichedAnalyzer::new(Arc::new(enricher))
                .analyze(&walking())
                .await
                .unwrap();
            assert_eq!(out.source, AnalysisSource::BaselineOnly);
        }
    }

    #[tokio::test]
    async fn blank_behavior_still_yields_a_baseline() {
        let blank = Observation {
            behavior: "   ".into(),
            category: BehaviorCategory::Social,
            age_months: 30,
            context: None,
        };
        let enricher = Fixed(Ok(Enrichment::default()), false);

        let out = BaselineEnrichedAnalyzer::new(Arc::new(enricher))
            .analyze(&blank)
            .await
            .unwrap();

        assert_eq!(out.source, AnalysisSource::BaselineOnly);
        assert!(out.milestone.is_none());
        assert!(!out.interpretation.is_empty());
    }
}
