//! Generative-text backends.
//!
//! [`TextGenerator`] is the seam the classifier talks to. [`OpenAiGenerator`]
//! speaks the OpenAI-compatible `/chat/completions` protocol, which also
//! covers OpenRouter, vLLM and Ollama's `/v1` endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use decisync_core::DecisionError;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

pub const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str =
    "You classify legal decisions. Reply with a single JSON object and nothing else.";
const SLOW_GENERATION_MS: u128 = 30_000;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Completes `prompt` in strict-JSON mode and returns the raw model text.
    async fn generate_json(&self, prompt: &str, temperature: f32) -> Result<String, DecisionError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    /// Bearer token; `None` for local servers.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_URL.to_string(),
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, DecisionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DecisionError::invalid_input(format!("building llm client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            model: config.model,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate_json(&self, prompt: &str, temperature: f32) -> Result<String, DecisionError> {
        let start = Instant::now();
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            stream: false,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DecisionError::generation(0, format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DecisionError::generation(
                status.as_u16(),
                format!("completion returned {status}: {body}"),
            ));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            DecisionError::generation(status.as_u16(), format!("failed to parse response: {e}"))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DecisionError::generation(status.as_u16(), "completion had no choices"))?;

        let elapsed = start.elapsed().as_millis();
        debug!(response_len = content.len(), duration_ms = elapsed as u64, "generation complete");
        if elapsed > SLOW_GENERATION_MS {
            warn!(duration_ms = elapsed as u64, slow = true, "slow generation");
        }
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
