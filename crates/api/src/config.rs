use std::net::SocketAddr;

use anyhow::Context;

use sprout_ai::EnrichmentConfig;
use sprout_infra::AnalysisConfig;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Postgres when set; in-memory stores otherwise.
    pub database_url: Option<String>,
    pub analysis: AnalysisConfig,
    pub enrichment: EnrichmentConfig,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let raw_addr = lookup("SPROUT_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .with_context(|| format!("invalid SPROUT_BIND_ADDR: {raw_addr}"))?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        Ok(Self {
            bind_addr,
            database_url,
            analysis: AnalysisConfig::from_lookup(&lookup)?,
            enrichment: EnrichmentConfig::from_lookup(&lookup),
        })
    }
}
