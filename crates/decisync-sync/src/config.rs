use std::time::Duration;

use decisync_ai::GeneratorConfig;
use decisync_client::{ClientConfig, DEFAULT_PAGE_DELAY};
use tracing::warn;

/// Reads a positive whole number of seconds, keeping `default` when the
/// value is missing and warning when it is present but unusable.
fn parse_secs(name: &str, raw: Option<String>, default: u64) -> u64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => secs,
        _ => {
            warn!(var = name, value = %raw, default, "ignoring invalid timeout; using default");
            default
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub decision_api_url: String,
    /// Postgres URL; without one the pipeline runs against an in-memory store.
    pub database_url: Option<String>,
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            decision_api_url: std::env::var("DECISION_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            llm_api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| decisync_ai::generator::DEFAULT_LLM_URL.to_string()),
            llm_api_key: std::env::var("LLM_API_KEY").ok().filter(|v| !v.trim().is_empty()),
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| decisync_ai::generator::DEFAULT_LLM_MODEL.to_string()),
            user_agent: std::env::var("DECISYNC_USER_AGENT")
                .unwrap_or_else(|_| "decisync-bot/0.1".to_string()),
            http_timeout_secs: parse_secs(
                "DECISYNC_HTTP_TIMEOUT_SECS",
                std::env::var("DECISYNC_HTTP_TIMEOUT_SECS").ok(),
                20,
            ),
            llm_timeout_secs: parse_secs(
                "DECISYNC_LLM_TIMEOUT_SECS",
                std::env::var("DECISYNC_LLM_TIMEOUT_SECS").ok(),
                60,
            ),
            scheduler_enabled: std::env::var("DECISYNC_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: std::env::var("SYNC_CRON").unwrap_or_else(|_| "0 0 6 * * *".to_string()),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.decision_api_url.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            base_url: self.llm_api_url.clone(),
            api_key: self.llm_api_key.clone(),
            model: self.llm_model.clone(),
            timeout: Duration::from_secs(self.llm_timeout_secs),
        }
    }
}
