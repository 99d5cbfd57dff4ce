//! OpenAI-compatible chat-completions enricher.
//!
//! The model is asked for a JSON object with the optional [`Enrichment`] fields.
//! Anything other than a usable object is reported as a strategy error so the
//! composite keeps its baseline.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use sprout_core::Observation;

use crate::result::{AnalysisOutput, AnalyzerError, Enrichment};
use crate::strategy::EnrichmentStrategy;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

const SYSTEM_PROMPT: &str = "You are a child development specialist. Given a caregiver's \
observation and a baseline interpretation, respond with a single JSON object using only these \
optional keys: \"interpretation\" (string), \"psychologicalReading\" (string), \
\"developmentStage\" (string), \"suggestions\" (array of strings). Omit keys you cannot improve.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl EnrichmentConfig {
    /// Reads `SPROUT_LLM_*` variables. Missing or malformed values keep defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("SPROUT_LLM_API_URL").filter(|v| !v.trim().is_empty()) {
            config.api_url = url;
        }
        config.api_key = lookup("SPROUT_LLM_API_KEY").filter(|v| !v.trim().is_empty());
        if let Some(model) = lookup("SPROUT_LLM_MODEL").filter(|v| !v.trim().is_empty()) {
            config.model = model;
        }
        match lookup("SPROUT_LLM_TIMEOUT_MS").map(|v| v.trim().parse::<u64>()) {
            Some(Ok(ms)) if ms > 0 => config.timeout = Duration::from_millis(ms),
            Some(_) => tracing::warn!("ignoring invalid SPROUT_LLM_TIMEOUT_MS"),
            None => {}
        }
        config
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct LlmEnricher {
    config: EnrichmentConfig,
    client: reqwest::Client,
}

impl LlmEnricher {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    fn request_body(&self, observation: &Observation, baseline: &AnalysisOutput) -> serde_json::Value {
        let baseline_json = serde_json::to_string(baseline).unwrap_or_default();
        let user = format!(
            "Child age: {} months\nCategory: {}\nObservation: {}\nContext: {}\nBaseline: {}",
            observation.age_months,
            observation.category,
            observation.behavior.trim(),
            observation.context.as_deref().unwrap_or("none"),
            baseline_json,
        );
        json!({
            "model": self.config.model,
            "temperature": 0.3,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user },
            ],
        })
    }
}

#[async_trait]
impl EnrichmentStrategy for LlmEnricher {
    fn name(&self) -> &str {
        "llm"
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn enrich(
        &self,
        observation: &Observation,
        baseline: &AnalysisOutput,
    ) -> Result<Enrichment, AnalyzerError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AnalyzerError::Unavailable("no API key configured".into()))?;

        let resp = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(key)
            .timeout(self.config.timeout)
            .json(&self.request_body(observation, baseline))
            .send()
            .await
            .map_err(|e| AnalyzerError::InferenceFailed(format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AnalyzerError::InferenceFailed(format!("reading response failed: {e}")))?;

        if !status.is_success() {
            return Err(AnalyzerError::InferenceFailed(format!(
                "completion endpoint returned {}",
                status.as_u16()
            )));
        }

        debug!(bytes = body.len(), "completion received");
        parse_completion(&body)
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Extract an [`Enrichment`] from a raw chat-completions response body.
pub fn parse_completion(body: &str) -> Result<Enrichment, AnalyzerError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| AnalyzerError::InferenceFailed(format!("malformed completion: {e}")))?;

    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| AnalyzerError::InferenceFailed("completion has no content".into()))?;

    let enrichment: Enrichment = serde_json::from_str(strip_code_fence(&content))
        .map_err(|e| AnalyzerError::InferenceFailed(format!("content is not an enrichment object: {e}")))?;

    if enrichment.is_empty() {
        return Err(AnalyzerError::InferenceFailed("enrichment has no usable fields".into()));
    }
    Ok(enrichment)
}

// Models sometimes wrap JSON in ```json fences despite response_format.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
