use std::sync::Arc;

use tracing::{debug, warn};

use sprout_core::Observation;

use crate::composite::BaselineEnrichedAnalyzer;
use crate::llm::{EnrichmentConfig, LlmEnricher};
use crate::result::{AnalysisOutput, AnalysisSource, AnalyzerError, ConfidenceLevel};
use crate::rules::RuleBasedAnalyzer;
use crate::strategy::AnalyzerStrategy;

/// What happened on one pass through the chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReport {
    /// Strategy that produced the output, `None` when the fallback was used.
    pub used: Option<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<(String, AnalyzerError)>,
}

/// Priority-ordered strategies with a deterministic last resort.
#[derive(Clone)]
pub struct AnalyzerChain {
    strategies: Vec<Arc<dyn AnalyzerStrategy>>,
}

impl AnalyzerChain {
    /// Orders by descending priority. Ties keep registration order.
    pub fn new(mut strategies: Vec<Arc<dyn AnalyzerStrategy>>) -> Self {
        strategies.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        Self { strategies }
    }

    /// `[rules + llm enrichment, rules]`.
    pub fn standard(enrichment: EnrichmentConfig) -> Self {
        let enricher = Arc::new(LlmEnricher::new(enrichment));
        Self::new(vec![
            Arc::new(BaselineEnrichedAnalyzer::new(enricher)),
            Arc::new(RuleBasedAnalyzer::new()),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Always yields an output.
    pub async fn analyze(&self, observation: &Observation) -> AnalysisOutput {
        self.analyze_with_report(observation).await.0
    }

    pub async fn analyze_with_report(&self, observation: &Observation) -> (AnalysisOutput, ChainReport) {
        let mut report = ChainReport::default();

        for strategy in &self.strategies {
            let name = strategy.name().to_string();
            if !strategy.is_available() {
                debug!(strategy = %name, "strategy unavailable, skipping");
                report.skipped.push(name);
                continue;
            }

            match strategy.analyze(observation).await {
                Ok(output) => {
                    debug!(strategy = %name, source = ?output.source, "strategy succeeded");
                    report.used = Some(name);
                    return (output, report);
                }
                Err(e) => {
                    warn!(strategy = %name, error = %e, "strategy failed, trying next");
                    report.errors.push((name, e));
                }
            }
        }

        warn!(
            skipped = report.skipped.len(),
            failed = report.errors.len(),
            "every strategy skipped or failed, using fallback"
        );
        (fallback_output(observation), report)
    }
}

/// Hard-coded result returned when no strategy produced one.
pub fn fallback_output(observation: &Observation) -> AnalysisOutput {
    AnalysisOutput::new(
        format!(
            "Recorded a {} observation at {} months. A detailed interpretation is not available right now.",
            observation.category, observation.age_months
        ),
        ConfidenceLevel::Low,
        AnalysisSource::Fallback,
    )
    .with_development_stage("unknown")
    .with_suggestions(["Keep observing and logging similar moments; patterns become clearer over time."])
}
