//! Orchestrator configuration.

use std::time::Duration;

pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_millis(25_000);
pub const DEFAULT_MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Knobs for [`AnalysisOrchestrator`](crate::analysis::AnalysisOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Deadline for one analyzer chain attempt.
    pub analysis_timeout: Duration,
    /// How many timed-out attempts may be retried before the job is failed.
    pub max_retries: u32,
    /// Re-read the metrics aggregate after each write and log if it is inconsistent.
    pub metrics_invariant_check: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            metrics_invariant_check: cfg!(debug_assertions),
        }
    }
}

impl AnalysisConfig {
    /// Load from `SPROUT_ANALYSIS_TIMEOUT_MS`, `SPROUT_MAX_RETRIES` and
    /// `SPROUT_METRICS_INVARIANT_CHECK`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("SPROUT_ANALYSIS_TIMEOUT_MS") {
            let ms: u64 = parse(&raw, "SPROUT_ANALYSIS_TIMEOUT_MS")?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    key: "SPROUT_ANALYSIS_TIMEOUT_MS",
                    value: raw,
                    reason: "must be greater than zero".into(),
                });
            }
            config.analysis_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("SPROUT_MAX_RETRIES") {
            config.max_retries = parse(&raw, "SPROUT_MAX_RETRIES")?;
        }

        if let Some(raw) = lookup("SPROUT_METRICS_INVARIANT_CHECK") {
            config.metrics_invariant_check = parse_bool(&raw, "SPROUT_METRICS_INVARIANT_CHECK")?;
        }

        Ok(config)
    }

    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_metrics_invariant_check(mut self, enabled: bool) -> Self {
        self.metrics_invariant_check = enabled;
        self
    }
}

fn parse<T>(raw: &str, key: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(raw: &str, key: &'static str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AnalysisConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.analysis_timeout, Duration::from_secs(25));
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn reads_all_keys() {
        let config = AnalysisConfig::from_lookup(lookup(&[
            ("SPROUT_ANALYSIS_TIMEOUT_MS", "1500"),
            ("SPROUT_MAX_RETRIES", " 3 "),
            ("SPROUT_METRICS_INVARIANT_CHECK", "off"),
        ]))
        .unwrap();
        assert_eq!(config.analysis_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_retries, 3);
        assert!(!config.metrics_invariant_check);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = AnalysisConfig::from_lookup(lookup(&[("SPROUT_MAX_RETRIES", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SPROUT_MAX_RETRIES", .. }));

        assert!(AnalysisConfig::from_lookup(lookup(&[("SPROUT_ANALYSIS_TIMEOUT_MS", "0")])).is_err());
        assert!(AnalysisConfig::from_lookup(lookup(&[("SPROUT_METRICS_INVARIANT_CHECK", "maybe")])).is_err());
    }
}
