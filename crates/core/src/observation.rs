//! The caregiver's observation: what the analyzers interpret.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Oldest age (in months) an observation may describe.
pub const MAX_AGE_MONTHS: u32 = 216;

/// Developmental domain the caregiver filed the behavior under.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorCategory {
    Motor,
    Language,
    Social,
    Cognitive,
    Emotional,
    SelfCare,
    Other,
}

impl BehaviorCategory {
    pub const ALL: [BehaviorCategory; 7] = [
        BehaviorCategory::Motor,
        BehaviorCategory::Language,
        BehaviorCategory::Social,
        BehaviorCategory::Cognitive,
        BehaviorCategory::Emotional,
        BehaviorCategory::SelfCare,
        BehaviorCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BehaviorCategory::Motor => "motor",
            BehaviorCategory::Language => "language",
            BehaviorCategory::Social => "social",
            BehaviorCategory::Cognitive => "cognitive",
            BehaviorCategory::Emotional => "emotional",
            BehaviorCategory::SelfCare => "self_care",
            BehaviorCategory::Other => "other",
        }
    }
}

impl core::fmt::Display for BehaviorCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehaviorCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        BehaviorCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| DomainError::validation(format!("unknown behavior category '{s}'")))
    }
}

/// A short behavioral observation about a child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Free text as typed by the caregiver (e.g. "走了5步").
    pub behavior: String,
    pub category: BehaviorCategory,
    /// Child's age when the behavior was observed.
    pub age_months: u32,
    /// Optional surrounding context (setting, mood, who was present).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Observation {
    pub fn new(
        behavior: impl Into<String>,
        category: BehaviorCategory,
        age_months: u32,
    ) -> DomainResult<Self> {
        let behavior = behavior.into();
        if behavior.trim().is_empty() {
            return Err(DomainError::validation("behavior text must not be empty"));
        }
        if age_months > MAX_AGE_MONTHS {
            return Err(DomainError::validation(format!(
                "age_months must be <= {MAX_AGE_MONTHS} (got {age_months})"
            )));
        }
        Ok(Self {
            behavior,
            category,
            age_months,
            context: None,
        })
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Length of the behavior text in characters (not bytes).
    pub fn text_len(&self) -> usize {
        self.behavior.trim().chars().count()
    }

    pub fn has_context(&self) -> bool {
        self.context.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_behavior_and_implausible_age() {
        assert!(Observation::new("   ", BehaviorCategory::Motor, 14).is_err());
        assert!(Observation::new("walked", BehaviorCategory::Motor, MAX_AGE_MONTHS + 1).is_err());
    }

    #[test]
    fn counts_characters_not_bytes() {
        let obs = Observation::new("走了5步", BehaviorCategory::Motor, 14).unwrap();
        assert_eq!(obs.text_len(), 4);
        assert!(!obs.has_context());
        assert!(obs.with_context("in the park").has_context());
    }

    #[test]
    fn category_parsing_is_lenient_about_case_and_dashes() {
        assert_eq!("Self-Care".parse::<BehaviorCategory>().unwrap(), BehaviorCategory::SelfCare);
        assert_eq!("motor".parse::<BehaviorCategory>().unwrap(), BehaviorCategory::Motor);
        assert!("sleep".parse::<BehaviorCategory>().is_err());
    }
}
