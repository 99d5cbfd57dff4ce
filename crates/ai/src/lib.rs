//! `sprout-ai`
//!
//! **Responsibility:** turn an [`Observation`](sprout_core::Observation) into a
//! structured interpretation.
//!
//! This crate is intentionally storage-agnostic:
//! - Strategies are stateless and must not touch persisted records.
//! - The [`AnalyzerChain`] always yields a result; callers never see a strategy error.
//! - Lifecycle, retries and persistence live in `sprout-infra`.

pub mod chain;
pub mod composite;
pub mod llm;
pub mod result;
pub mod rules;
pub mod strategy;

pub use chain::{AnalyzerChain, ChainReport, fallback_output};
pub use composite::BaselineEnrichedAnalyzer;
pub use llm::{EnrichmentConfig, LlmEnricher};
pub use result::{
    AnalysisOutput, AnalysisSource, AnalyzerError, ConfidenceLevel, Enrichment, Milestone,
    MilestoneImportance,
};
pub use rules::{RuleBasedAnalyzer, development_stage};
pub use strategy::{AnalyzerStrategy, EnrichmentStrategy};
