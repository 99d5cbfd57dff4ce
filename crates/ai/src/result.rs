use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Confidence tier of an interpretation. `Low` is the lowest tier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// Which path through the analyzer chain produced a result.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    /// Deterministic rule table alone.
    RuleBased,
    /// Rule baseline overlaid with enrichment fields.
    Enriched,
    /// Composite whose enrichment step failed or was unavailable.
    BaselineOnly,
    /// Produced entirely by a language model.
    Llm,
    /// Hard-coded result returned when every strategy failed.
    Fallback,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneImportance {
    Notable,
    Important,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub label: String,
    pub importance: MilestoneImportance,
}

impl Milestone {
    pub fn new(label: impl Into<String>, importance: MilestoneImportance) -> Self {
        Self {
            label: label.into(),
            importance,
        }
    }
}

/// Structured interpretation of one observation.
///
/// This is the payload persisted on a record once its analysis is `done`, and
/// the `data` returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    pub milestone: Option<Milestone>,
    pub development_stage: String,
    pub interpretation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psychological_reading: Option<String>,
    pub suggestions: Vec<String>,
    pub confidence_level: ConfidenceLevel,
    pub source: AnalysisSource,
}

impl AnalysisOutput {
    pub fn new(
        interpretation: impl Into<String>,
        confidence_level: ConfidenceLevel,
        source: AnalysisSource,
    ) -> Self {
        Self {
            milestone: None,
            development_stage: String::new(),
            interpretation: interpretation.into(),
            psychological_reading: None,
            suggestions: Vec::new(),
            confidence_level,
            source,
        }
    }

    pub fn with_milestone(mut self, milestone: Milestone) -> Self {
        self.milestone = Some(milestone);
        self
    }

    pub fn with_development_stage(mut self, stage: impl Into<String>) -> Self {
        self.development_stage = stage.into();
        self
    }

    pub fn with_psychological_reading(mut self, reading: impl Into<String>) -> Self {
        self.psychological_reading = Some(reading.into());
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: AnalysisSource) -> Self {
        self.source = source;
        self
    }
}

/// Optional fields an enrichment strategy may contribute on top of a baseline.
///
/// Absent, null, or blank values never replace baseline content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    #[serde(default)]
    pub interpretation: Option<String>,
    #[serde(default)]
    pub psychological_reading: Option<String>,
    #[serde(default)]
    pub development_stage: Option<String>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
}

impl Enrichment {
    /// True when no field carries usable content.
    pub fn is_empty(&self) -> bool {
        non_blank(&self.interpretation).is_none()
            && non_blank(&self.psychological_reading).is_none()
            && non_blank(&self.development_stage).is_none()
            && usable_suggestions(&self.suggestions).is_none()
    }

    /// Overlay present fields onto `base` and tag the result as enriched.
    pub fn overlay(self, mut base: AnalysisOutput) -> AnalysisOutput {
        if let Some(v) = non_blank(&self.interpretation) {
            base.interpretation = v;
        }
        if let Some(v) = non_blank(&self.psychological_reading) {
            base.psychological_reading = Some(v);
        }
        if let Some(v) = non_blank(&self.development_stage) {
            base.development_stage = v;
        }
        if let Some(v) = usable_suggestions(&self.suggestions) {
            base.suggestions = v;
        }
        base.source = AnalysisSource::Enriched;
        base
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn usable_suggestions(value: &Option<Vec<String>>) -> Option<Vec<String>> {
    let cleaned: Vec<String> = value
        .as_ref()?
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("strategy unavailable: {0}")]
    Unavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> AnalysisOutput {
        AnalysisOutput::new("baseline text", ConfidenceLevel::Medium, AnalysisSource::RuleBased)
            .with_development_stage("sensorimotor")
            .with_psychological_reading("baseline reading")
            .with_suggestions(["keep going"])
    }

    #[test]
    fn overlay_replaces_only_present_fields() {
        let enriched = Enrichment {
            interpretation: Some("richer text".into()),
            psychological_reading: None,
            development_stage: Some("   ".into()),
            suggestions: Some(vec![]),
        }
        .overlay(baseline());

        assert_eq!(enriched.interpretation, "richer text");
        assert_eq!(enriched.psychological_reading.as_deref(), Some("baseline reading"));
        assert_eq!(enriched.development_stage, "sensorimotor");
        assert_eq!(enriched.suggestions, vec!["keep going".to_string()]);
        assert_eq!(enriched.source, AnalysisSource::Enriched);
        assert_eq!(enriched.confidence_level, ConfidenceLevel::Medium);
    }

    #[test]
    fn empty_enrichment_is_detected() {
        assert!(Enrichment::default().is_empty());
        assert!(
            Enrichment {
                suggestions: Some(vec![" ".into()]),
                ..Default::default()
            }
            .is_empty()
        );
    }

    #[test]
    fn output_serializes_with_caller_facing_field_names() {
        let json = serde_json::to_value(baseline()).unwrap();
        assert_eq!(json["confidenceLevel"], "medium");
        assert_eq!(json["source"], "rule_based");
        assert!(json.get("developmentStage").is_some());
    }
}
