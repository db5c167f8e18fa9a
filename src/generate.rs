//! Generation backends and the failover router.
//!
//! Each LLM backend implements [`GenerationProvider`]; the [`Router`]
//! holds them in configured priority order and walks the list until one
//! succeeds. Every attempt gets its own timeout. When the whole list is
//! exhausted the router reports one failure reason per backend, verbatim,
//! so operators can see exactly what broke where.
//!
//! Adding a backend means adding one implementation and one config entry;
//! nothing else branches on provider identity.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::{GenerationConfig, ProviderConfig};
use crate::error::QueryError;

/// Decoding settings shared by all backends.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Low by default: answers should lean deterministic.
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// A single text generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Stable identity used in logs and failure reports,
    /// e.g. `"openai/gpt-4o-mini"`.
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str, params: &DecodeParams) -> Result<String>;
}

/// A successful generation and the backend that produced it.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub provider: String,
}

/// Ordered failover chain over the configured backends.
pub struct Router {
    providers: Vec<Box<dyn GenerationProvider>>,
    timeouts: Vec<Duration>,
    params: DecodeParams,
}

impl Router {
    /// Build the router from configuration. API keys are read from each
    /// provider's environment variable at construction, so a missing key
    /// fails at startup rather than mid-query.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let mut providers: Vec<Box<dyn GenerationProvider>> = Vec::new();
        let mut timeouts = Vec::new();

        for entry in &config.providers {
            let provider: Box<dyn GenerationProvider> = match entry.kind.as_str() {
                "openai" => Box::new(OpenAiChat::new(entry)?),
                "anthropic" => Box::new(AnthropicMessages::new(entry)?),
                other => bail!("Unknown generation provider kind: {}", other),
            };
            providers.push(provider);
            timeouts.push(Duration::from_secs(entry.timeout_secs));
        }

        Ok(Self {
            providers,
            timeouts,
            params: DecodeParams {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        })
    }

    /// Build a router from pre-constructed providers with one shared
    /// per-attempt timeout.
    pub fn new(
        providers: Vec<Box<dyn GenerationProvider>>,
        attempt_timeout: Duration,
        params: DecodeParams,
    ) -> Self {
        let timeouts = vec![attempt_timeout; providers.len()];
        Self {
            providers,
            timeouts,
            params,
        }
    }

    /// Try each backend in order; first success short-circuits.
    pub async fn generate(&self, prompt: &str) -> Result<Generation, QueryError> {
        let mut reasons = Vec::with_capacity(self.providers.len());

        for (provider, timeout) in self.providers.iter().zip(&self.timeouts) {
            match tokio::time::timeout(*timeout, provider.generate(prompt, &self.params)).await {
                Ok(Ok(text)) => {
                    return Ok(Generation {
                        text,
                        provider: provider.name().to_string(),
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = provider.name(), error = %e, "generation attempt failed");
                    reasons.push(format!("{}: {}", provider.name(), e));
                }
                Err(_) => {
                    tracing::warn!(provider = provider.name(), "generation attempt timed out");
                    reasons.push(format!(
                        "{}: timed out after {}s",
                        provider.name(),
                        timeout.as_secs()
                    ));
                }
            }
        }

        Err(QueryError::GenerationUnavailable { reasons })
    }
}

// ============ OpenAI ============

/// Chat-completions backend for OpenAI-compatible APIs.
pub struct OpenAiChat {
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(entry: &ProviderConfig) -> Result<Self> {
        let env_var = entry.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = std::env::var(env_var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", env_var))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            name: format!("openai/{}", entry.model),
            model: entry.model.clone(),
            api_key,
            base_url,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, params: &DecodeParams) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "max_tokens": params.max_output_tokens,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("openai returned error (status {}): {}", status, body);
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("missing text in OpenAI response"))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

// ============ Anthropic ============

/// Messages-API backend for Anthropic models.
pub struct AnthropicMessages {
    name: String,
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl AnthropicMessages {
    pub fn new(entry: &ProviderConfig) -> Result<Self> {
        let env_var = entry.api_key_env.as_deref().unwrap_or("ANTHROPIC_API_KEY");
        let api_key = std::env::var(env_var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", env_var))?;

        Ok(Self {
            name: format!("anthropic/{}", entry.model),
            model: entry.model.clone(),
            api_key,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl GenerationProvider for AnthropicMessages {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, params: &DecodeParams) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "max_tokens": params.max_output_tokens,
            "temperature": params.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("anthropic returned error (status {}): {}", status, body);
        }

        let parsed: AnthropicResponse = response.json().await?;
        parsed
            .content
            .into_iter()
            .find_map(|part| part.text)
            .ok_or_else(|| anyhow::anyhow!("missing text in Anthropic response"))
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}
